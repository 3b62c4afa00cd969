use crate::config::ScheduleSettings;

/// Learning rate as a function of the zero-based epoch index.
pub trait LrSchedule: Send {
    fn learning_rate(&self, epoch: usize) -> f32;
}

impl<F> LrSchedule for F
where
    F: Fn(usize) -> f32 + Send,
{
    fn learning_rate(&self, epoch: usize) -> f32 {
        self(epoch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant(pub f32);

impl LrSchedule for Constant {
    fn learning_rate(&self, _epoch: usize) -> f32 {
        self.0
    }
}

/// Piecewise-constant decay of a base rate.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDecay {
    pub base_rate: f32,
    /// `(after_epoch, factor)` pairs, ascending by epoch.
    pub steps: Vec<(usize, f32)>,
}

impl StepDecay {
    pub fn new(base_rate: f32) -> Self {
        Self {
            base_rate,
            steps: vec![(80, 1e-1), (120, 1e-2), (160, 1e-3), (180, 0.5e-3)],
        }
    }
}

impl Default for StepDecay {
    fn default() -> Self {
        Self::new(1e-3)
    }
}

impl LrSchedule for StepDecay {
    fn learning_rate(&self, epoch: usize) -> f32 {
        let factor = self
            .steps
            .iter()
            .rev()
            .find(|(after, _)| epoch > *after)
            .map_or(1.0, |(_, factor)| *factor);
        self.base_rate * factor
    }
}

/// Build the schedule selected in the settings file.
pub fn from_settings(settings: ScheduleSettings) -> Box<dyn LrSchedule> {
    match settings {
        ScheduleSettings::Step { base_rate } => Box::new(StepDecay::new(base_rate)),
        ScheduleSettings::Constant { rate } => Box::new(Constant(rate)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_decay_boundaries() {
        let schedule = StepDecay::default();
        let cases = [
            (0, 1e-3),
            (80, 1e-3),
            (81, 1e-4),
            (121, 1e-5),
            (161, 1e-6),
            (181, 0.5e-6),
        ];
        for (epoch, expected) in cases {
            let rate = schedule.learning_rate(epoch);
            assert!((rate - expected).abs() <= expected * 1e-5, "epoch {epoch}: {rate}");
        }
    }

    #[test]
    fn closures_are_schedules() {
        let halving = |epoch: usize| 1.0 / (1 << epoch) as f32;
        assert_eq!(halving.learning_rate(3), 0.125);
        let boxed = from_settings(ScheduleSettings::Constant { rate: 0.25 });
        assert_eq!(boxed.learning_rate(500), 0.25);
    }
}
