use std::collections::VecDeque;

const WINDOW: usize = 10;
const REPEAT_LIMIT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagnationVerdict {
    Ok,
    Loop,
}

/// Sliding window over recent action signatures. Flags a loop when the
/// newest signature has occurred four times in the window (flat repetition)
/// or the last four entries alternate A-B-A-B (two-step oscillation, e.g. a
/// dialog that keeps reopening).
#[derive(Debug, Default)]
pub struct StagnationDetector {
    recent: VecDeque<String>,
}

impl StagnationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, signature: &str) -> StagnationVerdict {
        self.recent.push_back(signature.to_string());
        if self.recent.len() > WINDOW {
            self.recent.pop_front();
        }

        let repeats = self.recent.iter().filter(|s| s.as_str() == signature).count();
        if repeats >= REPEAT_LIMIT {
            return StagnationVerdict::Loop;
        }

        if self.recent.len() >= 4 {
            let last4: Vec<&String> = self.recent.iter().rev().take(4).collect();
            // Reversed order: [newest, B, A, B]; alternation holds when
            // positions 0/2 and 1/3 match and the two signatures differ.
            if last4[0] == last4[2] && last4[1] == last4[3] && last4[0] != last4[1] {
                return StagnationVerdict::Loop;
            }
        }

        StagnationVerdict::Ok
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(detector: &mut StagnationDetector, signatures: &[&str]) -> Vec<StagnationVerdict> {
        signatures.iter().map(|s| detector.observe(s)).collect()
    }

    #[test]
    fn test_three_repeats_do_not_trigger() {
        let mut detector = StagnationDetector::new();
        let verdicts = feed(&mut detector, &["click:#x", "click:#x", "click:#x"]);
        assert!(verdicts.iter().all(|v| *v == StagnationVerdict::Ok));
    }

    #[test]
    fn test_fourth_repeat_triggers() {
        let mut detector = StagnationDetector::new();
        let verdicts = feed(&mut detector, &["click:#x", "click:#x", "click:#x", "click:#x"]);
        assert_eq!(*verdicts.last().unwrap(), StagnationVerdict::Loop);
    }

    #[test]
    fn test_interleaved_repeats_still_counted_in_window() {
        let mut detector = StagnationDetector::new();
        let verdicts = feed(
            &mut detector,
            &["click:#x", "scroll", "click:#x", "wait", "click:#x", "navigate", "click:#x"],
        );
        assert_eq!(*verdicts.last().unwrap(), StagnationVerdict::Loop);
        assert!(verdicts[..verdicts.len() - 1].iter().all(|v| *v == StagnationVerdict::Ok));
    }

    #[test]
    fn test_repeat_outside_window_forgotten() {
        let mut detector = StagnationDetector::new();
        // Three early clicks, then enough noise to push them out of the
        // 10-entry window before the fourth.
        let mut sequence = vec!["click:#x", "click:#x", "click:#x"];
        let noise = ["a", "b", "c", "d", "e", "f", "g", "h"];
        sequence.extend(noise);
        sequence.push("click:#x");
        let verdicts = feed(&mut detector, &sequence);
        assert_eq!(*verdicts.last().unwrap(), StagnationVerdict::Ok);
    }

    #[test]
    fn test_abab_oscillation_triggers() {
        let mut detector = StagnationDetector::new();
        let verdicts = feed(
            &mut detector,
            &["press_key:Escape", "click:#open", "press_key:Escape", "click:#open"],
        );
        // The window holds E,C,E,C after four observations: A-B-A-B.
        assert_eq!(*verdicts.last().unwrap(), StagnationVerdict::Loop);
    }

    #[test]
    fn test_aabb_not_oscillation() {
        let mut detector = StagnationDetector::new();
        let verdicts = feed(&mut detector, &["a", "a", "b", "b"]);
        assert!(verdicts.iter().all(|v| *v == StagnationVerdict::Ok));
    }

    #[test]
    fn test_aaaa_pattern_is_repeat_not_alternation() {
        let mut detector = StagnationDetector::new();
        feed(&mut detector, &["a", "a", "a"]);
        // Identical signatures must trip the repeat rule, never the A!=B
        // alternation rule.
        assert_eq!(detector.observe("a"), StagnationVerdict::Loop);
    }

    #[test]
    fn test_distinct_actions_never_trigger() {
        let mut detector = StagnationDetector::new();
        let signatures: Vec<String> = (0..20).map(|i| format!("click:#item-{}", i)).collect();
        for s in &signatures {
            assert_eq!(detector.observe(s), StagnationVerdict::Ok);
        }
    }

    #[test]
    fn test_reset_clears_window() {
        let mut detector = StagnationDetector::new();
        feed(&mut detector, &["a", "a", "a"]);
        detector.reset();
        assert_eq!(detector.observe("a"), StagnationVerdict::Ok);
    }
}
