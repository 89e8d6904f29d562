//! Floating point ETX, exponentially aged on every HELLO received or missed.

use crate::metric::{LinkLq, LinkMetric, LqSamples, LqTuple, LINK_COST_BROKEN, MAX_LQ};

/// Number of initial hellos aged with the fast quickstart factor
pub const LQ_QUICKSTART_STEPS: u8 = 12;
const LQ_QUICKSTART_AGING: f32 = 0.25;

pub struct EtxFloat {
    aging: f32,
    min_useful_lq: u8,
}

impl EtxFloat {
    pub fn new(aging: f32, min_useful_lq: u8) -> Self {
        Self {
            aging: aging.clamp(0.0, 1.0),
            min_useful_lq,
        }
    }

    fn cost(&self, lq: f32, nlq: f32) -> u32 {
        let min = self.min_useful_lq.max(1) as f32 / MAX_LQ as f32;
        if lq < min || nlq < min {
            return LINK_COST_BROKEN;
        }
        let cost = 65536.0 / (lq * nlq);
        if cost >= LINK_COST_BROKEN as f32 {
            LINK_COST_BROKEN
        } else {
            (cost as u32).max(1)
        }
    }
}

fn to_wire(value: f32) -> u8 {
    (value * MAX_LQ as f32).round().clamp(0.0, MAX_LQ as f32) as u8
}

impl LinkMetric for EtxFloat {
    fn name(&self) -> &'static str {
        "etx_float"
    }

    fn new_link(&self) -> LinkLq {
        LinkLq {
            tuple: LqTuple::default(),
            samples: LqSamples::Aging { lq: 0.0, hellos: 0 },
        }
    }

    fn hello_received(&self, lq: &mut LinkLq, lost: bool) {
        let LqSamples::Aging { lq: value, hellos } = &mut lq.samples else {
            return;
        };
        let alpha = if *hellos < LQ_QUICKSTART_STEPS {
            *hellos += 1;
            LQ_QUICKSTART_AGING
        } else {
            self.aging
        };
        *value *= 1.0 - alpha;
        if !lost {
            *value += alpha;
        }
        lq.tuple.lq = to_wire(*value);
    }

    fn link_cost(&self, lq: &LinkLq) -> u32 {
        match lq.samples {
            LqSamples::Aging { lq: value, .. } => self.cost(value, lq.tuple.nlq as f32 / MAX_LQ as f32),
            _ => self.tuple_cost(&lq.tuple),
        }
    }

    fn tuple_cost(&self, tuple: &LqTuple) -> u32 {
        self.cost(
            tuple.lq as f32 / MAX_LQ as f32,
            tuple.nlq as f32 / MAX_LQ as f32,
        )
    }
}
