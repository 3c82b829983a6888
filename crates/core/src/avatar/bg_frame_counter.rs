//! Idle background-frame cycler

/// Bounces an index between `0` and `total - 1`
///
/// Each call returns the current index, then advances it by `step` unit
/// moves, reversing direction whenever a move would leave the range.
#[derive(Debug, Clone)]
pub struct BgFrameCounter {
    total: usize,
    step: usize,
    index: usize,
    forward: bool,
}

impl BgFrameCounter {
    pub fn new(total: usize, step: usize) -> Self {
        Self {
            total,
            step,
            index: 0,
            forward: true,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn next_index(&mut self) -> usize {
        if self.total <= 1 {
            return 0;
        }
        let current = self.index;
        for _ in 0..self.step {
            let at_bound = if self.forward {
                self.index + 1 >= self.total
            } else {
                self.index == 0
            };
            if at_bound {
                self.forward = !self.forward;
            }
            if self.forward {
                self.index += 1;
            } else {
                self.index -= 1;
            }
        }
        current
    }
}
