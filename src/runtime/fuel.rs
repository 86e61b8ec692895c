//! Instruction budget for the [`Machine`](super::Machine)

/// Each executed instruction burns one unit. An empty tank stops
/// [`Machine::run`](super::Machine::run) with
/// [`Status::OutOfFuel`](super::Status::OutOfFuel); the machine keeps its
/// place, so a refilled tank picks up where it left off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fuel {
    tank: u32,
}

impl Fuel {
    pub fn with(tank: u32) -> Self {
        Self { tank }
    }

    pub fn refill(&mut self, amount: u32) {
        self.tank = self.tank.saturating_add(amount);
    }

    pub fn remaining(&self) -> u32 {
        self.tank
    }

    /// Pays for one instruction, or returns false if the tank is empty.
    pub fn burn(&mut self) -> bool {
        match self.tank.checked_sub(1) {
            Some(rest) => {
                self.tank = rest;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Fuel;
    use assert2::check;

    #[test]
    fn burning_stops_at_empty() {
        let mut fuel = Fuel::with(2);
        check!(fuel.burn());
        check!(fuel.burn());
        check!(!fuel.burn());
        check!(fuel.remaining() == 0);
    }

    #[test]
    fn refill_saturates() {
        let mut fuel = Fuel::with(u32::MAX - 1);
        fuel.refill(10);
        check!(fuel.remaining() == u32::MAX);
    }
}
