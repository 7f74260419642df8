/// Move-ratio gate shared by every adversary behaviour.
///
/// The counter advances once per navigator step; the gate opens (and the
/// counter resets) when it reaches `threshold`. With the default threshold of
/// 2 the navigator moves twice for every adversary move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveGate {
    counter: u32,
    threshold: u32,
}

impl MoveGate {
    /// A zero threshold is treated as 1 (move every step).
    pub fn new(threshold: u32) -> Self {
        MoveGate {
            counter: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn advance_counter(&mut self) {
        self.counter = self.counter.saturating_add(1);
    }

    /// Whether the counter has reached the threshold. Does not reset it.
    pub fn may_move(&self) -> bool {
        self.counter >= self.threshold
    }

    /// Advance, and report whether the adversary moves this step. Resets the
    /// counter when it does.
    pub fn can_move(&mut self) -> bool {
        self.advance_counter();
        if self.may_move() {
            self.counter = 0;
            true
        } else {
            false
        }
    }
}

impl Default for MoveGate {
    fn default() -> Self {
        Self::new(2)
    }
}
