use std::path::PathBuf;

pub(super) const MAX_WORKER_COUNT: usize = 32;

pub(super) fn default_true() -> bool {
    true
}

pub(super) fn default_manifest() -> PathBuf {
    PathBuf::from("labels.csv")
}

pub(super) fn default_train_size() -> f64 {
    0.8
}

pub(super) fn default_batch_size() -> usize {
    32
}

pub(super) fn default_epochs() -> usize {
    20
}

pub(super) fn default_seed() -> u64 {
    42
}

pub(super) fn default_workers() -> usize {
    4
}

pub(super) fn default_hidden_size() -> usize {
    128
}

pub(super) fn default_l2_penalty() -> f32 {
    1e-4
}

pub(super) fn default_base_rate() -> f32 {
    1e-3
}

pub(super) fn clamp_worker_count(value: usize) -> usize {
    value.min(MAX_WORKER_COUNT)
}
