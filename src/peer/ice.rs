use crate::peer::types::IceCandidate;
use parking_lot::Mutex;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(c: IceCandidate) -> Self {
        RTCIceCandidateInit {
            candidate: c.candidate,
            sdp_mid: c.sdp_mid,
            sdp_mline_index: c.sdp_mline_index,
            username_fragment: c.username_fragment,
        }
    }
}

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        IceCandidate {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }
}

/// Remote candidates that arrived before the remote description was set.
/// Append-only while a negotiation is in flight; drained in arrival order
/// once the description lands.
#[derive(Default)]
pub struct CandidateQueue {
    inner: Mutex<Vec<IceCandidate>>,
}

impl CandidateQueue {
    pub fn push(&self, candidate: IceCandidate) {
        self.inner.lock().push(candidate);
    }

    pub fn drain(&self) -> Vec<IceCandidate> {
        self.inner.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Classifies a candidate line for diagnostics (host/srflx/relay mix tells
/// you whether STUN resolution worked).
pub fn candidate_kind(candidate: &str) -> &'static str {
    if candidate.contains("typ host") {
        "host"
    } else if candidate.contains("typ srflx") {
        "srflx"
    } else if candidate.contains("typ relay") {
        "relay"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(line: &str) -> IceCandidate {
        IceCandidate {
            candidate: line.to_string(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[test]
    fn queue_preserves_arrival_order() {
        let queue = CandidateQueue::default();
        queue.push(cand("a"));
        queue.push(cand("b"));
        queue.push(cand("c"));
        let drained = queue.drain();
        let lines: Vec<_> = drained.iter().map(|c| c.candidate.as_str()).collect();
        assert_eq!(lines, ["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn classifies_candidate_types() {
        assert_eq!(candidate_kind("candidate:1 1 udp 1 10.0.0.1 5000 typ host"), "host");
        assert_eq!(candidate_kind("candidate:2 1 udp 1 1.2.3.4 5000 typ srflx"), "srflx");
        assert_eq!(candidate_kind("candidate:3 1 udp 1 5.6.7.8 5000 typ relay"), "relay");
        assert_eq!(candidate_kind("garbage"), "other");
    }
}
