use crate::cursor::CursorMut;
use crate::cursor::WireResult;
use crate::metric::{LinkLq, LinkMetric, LqSamples, LqTuple, MAX_LQ};

/// Plain hop count: every usable link costs one.
pub struct HopCount;

impl LinkMetric for HopCount {
    fn name(&self) -> &'static str {
        "hopcount"
    }

    fn new_link(&self) -> LinkLq {
        LinkLq {
            tuple: LqTuple::new(MAX_LQ, MAX_LQ),
            samples: LqSamples::Constant,
        }
    }

    fn tuple_cost(&self, _tuple: &LqTuple) -> u32 {
        1
    }

    fn memorize_foreign(&self, _lq: &mut LinkLq, _foreign: Option<LqTuple>) {}

    fn serialize(&self, _tuple: &LqTuple, cursor: &mut CursorMut<'_>) -> WireResult<()> {
        LqTuple::new(MAX_LQ, MAX_LQ).write(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_link_costs_one_hop() {
        let mut buffer = [0u8; 4];
        let mut lq = HopCount.new_link();
        HopCount.memorize_foreign(&mut lq, None);
        assert_eq!(HopCount.link_cost(&lq), 1);
        HopCount
            .serialize(&LqTuple::new(3, 4), &mut CursorMut::new(&mut buffer))
            .unwrap();
        assert_eq!(buffer, [255, 255, 0, 0]);
    }
}
