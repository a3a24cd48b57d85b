/// Decides when the user counts as away from the machine.
pub struct IdleGate {
    threshold_ms: u64,
}

impl IdleGate {
    pub fn from_seconds(threshold_s: u64) -> Self {
        Self {
            threshold_ms: threshold_s * 1000,
        }
    }

    /// Idle only when strictly past the threshold; sitting exactly on it
    /// still counts as active.
    pub fn is_idle(&self, idle_time_ms: u64) -> bool {
        self.threshold_ms < idle_time_ms
    }
}

#[cfg(test)]
mod tests {
    use super::IdleGate;

    #[test]
    fn threshold_is_exclusive() {
        let gate = IdleGate::from_seconds(10);
        assert!(!gate.is_idle(0));
        assert!(!gate.is_idle(10_000));
        assert!(gate.is_idle(10_001));
    }
}
