//! H.264 RTP payloads (RFC 6184): single NAL unit and FU-A fragmentation.

/// NAL unit type for FU-A fragments.
const NAL_TYPE_FU_A: u8 = 28;

/// FU header start/end bits.
const FU_START_BIT: u8 = 0x80;
const FU_END_BIT: u8 = 0x40;

/// NAL unit type from the header byte.
pub fn nal_type(nal: &[u8]) -> Option<u8> {
    nal.first().map(|b| b & 0x1F)
}

/// Splits NAL units into RTP payloads no larger than the MTU.
#[derive(Debug, Clone)]
pub struct H264Payloader {
    mtu: usize,
}

impl H264Payloader {
    pub fn new(mtu: usize) -> Self {
        Self { mtu }
    }

    /// Payloads for one NAL unit (without start code).
    pub fn payload(&self, nal: &[u8]) -> Vec<Vec<u8>> {
        if nal.is_empty() {
            return Vec::new();
        }
        if nal.len() <= self.mtu {
            return vec![nal.to_vec()];
        }
        self.fragment(nal)
    }

    fn fragment(&self, nal: &[u8]) -> Vec<Vec<u8>> {
        let Some(unit_type) = nal_type(nal) else {
            return Vec::new();
        };
        // F and NRI carry over, type becomes FU-A
        let fu_indicator = (nal[0] & 0xE0) | NAL_TYPE_FU_A;

        let body = &nal[1..];
        let max_fragment = self.mtu.saturating_sub(2).max(1);
        let count = body.len().div_ceil(max_fragment);

        body.chunks(max_fragment)
            .enumerate()
            .map(|(i, chunk)| {
                let mut fu_header = unit_type;
                if i == 0 {
                    fu_header |= FU_START_BIT;
                }
                if i + 1 == count {
                    fu_header |= FU_END_BIT;
                }
                let mut payload = Vec::with_capacity(2 + chunk.len());
                payload.push(fu_indicator);
                payload.push(fu_header);
                payload.extend_from_slice(chunk);
                payload
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_nal_is_single_payload() {
        let nal = vec![0x67, 0x42, 0x00, 0x1f];
        let payloads = H264Payloader::new(1200).payload(&nal);
        assert_eq!(payloads, vec![nal]);
    }

    #[test]
    fn test_large_nal_fragments() {
        let mut nal = vec![0x65];
        nal.extend(std::iter::repeat(0xAB).take(3000));
        let payloads = H264Payloader::new(1200).payload(&nal);
        assert_eq!(payloads.len(), 3);

        for p in &payloads {
            assert!(p.len() <= 1200);
            assert_eq!(p[0] & 0x1F, NAL_TYPE_FU_A);
            assert_eq!(p[0] & 0x60, 0x60);
            assert_eq!(p[1] & 0x1F, 5);
        }
        assert_eq!(payloads[0][1] & FU_START_BIT, FU_START_BIT);
        assert_eq!(payloads[1][1] & (FU_START_BIT | FU_END_BIT), 0);
        assert_eq!(payloads[2][1] & FU_END_BIT, FU_END_BIT);

        let body: usize = payloads.iter().map(|p| p.len() - 2).sum();
        assert_eq!(body, 3000);
    }

    #[test]
    fn test_fu_header_carries_unit_type() {
        let mut nal = vec![0x21];
        nal.extend(std::iter::repeat(0x00).take(100));
        let payloads = H264Payloader::new(40).payload(&nal);
        assert!(payloads.len() > 1);
        for p in &payloads {
            assert_eq!(p[0], 0x20 | NAL_TYPE_FU_A);
            assert_eq!(nal_type(&p[1..]), nal_type(&nal));
        }
    }

    #[test]
    fn test_empty_nal() {
        assert!(H264Payloader::new(1200).payload(&[]).is_empty());
        assert_eq!(nal_type(&[]), None);
        assert_eq!(nal_type(&[0x68]), Some(8));
    }
}
