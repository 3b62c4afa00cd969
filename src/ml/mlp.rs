//! Single hidden layer MLP over flattened images.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{Array2, ArrayView1, ArrayView4, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{BatchStats, InputShape, ModelError, TrainableModel};
use crate::augment::Batch;

const MODEL_VERSION: i64 = 1;

#[derive(Debug, Clone)]
pub struct MlpOptions {
    pub hidden_size: usize,
    pub l2_penalty: f32,
    pub learning_rate: f32,
    pub seed: u64,
}

impl Default for MlpOptions {
    fn default() -> Self {
        Self {
            hidden_size: 128,
            l2_penalty: 1e-4,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

/// Serialized weights; this is the checkpoint file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpWeights {
    pub model_version: i64,
    pub input_shape: InputShape,
    pub n_classes: usize,
    pub hidden_size: usize,
    pub weights1: Vec<f32>,
    pub bias1: Vec<f32>,
    pub weights2: Vec<f32>,
    pub bias2: Vec<f32>,
}

impl MlpWeights {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.model_version != MODEL_VERSION {
            return Err(ModelError::Invalid(format!(
                "unsupported model_version {} (expected {MODEL_VERSION})",
                self.model_version
            )));
        }
        let input = self.input_shape.len();
        let hidden = self.hidden_size;
        let checks = [
            ("weights1", self.weights1.len(), input * hidden),
            ("bias1", self.bias1.len(), hidden),
            ("weights2", self.weights2.len(), self.n_classes * hidden),
            ("bias2", self.bias2.len(), self.n_classes),
        ];
        for (name, found, expected) in checks {
            if found != expected {
                return Err(ModelError::Invalid(format!(
                    "{name} has {found} values, expected {expected}"
                )));
            }
        }
        Ok(())
    }

    fn hidden_pre(&self, x: &[f32], out: &mut [f32]) {
        let d = self.input_shape.len();
        for (h, value) in out.iter_mut().enumerate() {
            let row = &self.weights1[h * d..(h + 1) * d];
            *value = self.bias1[h] + row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>();
        }
    }

    fn logits(&self, hidden_act: &[f32], out: &mut [f32]) {
        let hidden = self.hidden_size;
        for (c, value) in out.iter_mut().enumerate() {
            let row = &self.weights2[c * hidden..(c + 1) * hidden];
            *value = self.bias2[c] + row.iter().zip(hidden_act).map(|(w, v)| w * v).sum::<f32>();
        }
    }
}

/// Mini-batch SGD classifier with ReLU hidden units and a softmax head.
#[derive(Debug, Clone)]
pub struct MlpClassifier {
    options: MlpOptions,
    learning_rate: f32,
    weights: Option<MlpWeights>,
}

impl MlpClassifier {
    pub fn new(options: MlpOptions) -> Self {
        Self {
            learning_rate: options.learning_rate,
            options,
            weights: None,
        }
    }

    /// Restore a classifier from a checkpoint file.
    pub fn load(path: &Path, options: MlpOptions) -> Result<Self, ModelError> {
        let file = File::open(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let weights: MlpWeights =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| ModelError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        weights.validate()?;
        Ok(Self {
            learning_rate: options.learning_rate,
            options,
            weights: Some(weights),
        })
    }

    pub fn weights(&self) -> Option<&MlpWeights> {
        self.weights.as_ref()
    }

    fn prepared(&self) -> Result<&MlpWeights, ModelError> {
        self.weights.as_ref().ok_or(ModelError::NotPrepared)
    }

    fn check_images(weights: &MlpWeights, shape: &[usize]) -> Result<(), ModelError> {
        if shape[1..] != weights.input_shape.dims() {
            return Err(ModelError::InputShape {
                expected: weights.input_shape,
                found: shape[1..].to_vec(),
            });
        }
        Ok(())
    }
}

impl TrainableModel for MlpClassifier {
    fn prepare(&mut self, input_shape: InputShape, n_classes: usize) -> Result<(), ModelError> {
        if input_shape.is_empty() || n_classes == 0 {
            return Err(ModelError::Invalid(format!(
                "cannot prepare for input {input_shape} with {n_classes} classes"
            )));
        }
        let d = input_shape.len();
        let hidden = self.options.hidden_size.max(1);
        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let scale1 = 2.0 / (d as f32).sqrt();
        let scale2 = 2.0 / (hidden as f32).sqrt();
        let weights1 = (0..hidden * d)
            .map(|_| (rng.random::<f32>() - 0.5) * scale1)
            .collect();
        let weights2 = (0..n_classes * hidden)
            .map(|_| (rng.random::<f32>() - 0.5) * scale2)
            .collect();
        self.weights = Some(MlpWeights {
            model_version: MODEL_VERSION,
            input_shape,
            n_classes,
            hidden_size: hidden,
            weights1,
            bias1: vec![0.0; hidden],
            weights2,
            bias2: vec![0.0; n_classes],
        });
        self.learning_rate = self.options.learning_rate;
        tracing::debug!("Prepared MLP: input {input_shape}, {hidden} hidden, {n_classes} classes");
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.weights.is_some()
    }

    fn input_shape(&self) -> Option<InputShape> {
        self.weights.as_ref().map(|weights| weights.input_shape)
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, rate: f32) {
        self.learning_rate = rate;
    }

    fn train_batch(&mut self, batch: &Batch) -> Result<BatchStats, ModelError> {
        let l2 = self.options.l2_penalty;
        let learning_rate = self.learning_rate;
        let weights = self.weights.as_mut().ok_or(ModelError::NotPrepared)?;
        Self::check_images(weights, batch.images.shape())?;
        let n_classes = weights.n_classes;
        if batch.labels.ncols() != n_classes {
            return Err(ModelError::LabelWidth {
                expected: n_classes,
                found: batch.labels.ncols(),
            });
        }
        if batch.is_empty() {
            return Ok(BatchStats::default());
        }
        let d = weights.input_shape.len();
        let hidden = weights.hidden_size;

        let mut d_w1 = vec![0.0f32; weights.weights1.len()];
        let mut d_b1 = vec![0.0f32; hidden];
        let mut d_w2 = vec![0.0f32; weights.weights2.len()];
        let mut d_b2 = vec![0.0f32; n_classes];
        let mut hidden_pre = vec![0.0f32; hidden];
        let mut hidden_act = vec![0.0f32; hidden];
        let mut logits = vec![0.0f32; n_classes];
        let mut probs = vec![0.0f32; n_classes];
        let mut d_hidden = vec![0.0f32; hidden];
        let mut stats = BatchStats::default();

        for (image, target) in batch.images.axis_iter(Axis(0)).zip(batch.labels.rows()) {
            let x: Vec<f32> = image.iter().copied().collect();
            weights.hidden_pre(&x, &mut hidden_pre);
            for (act, &pre) in hidden_act.iter_mut().zip(&hidden_pre) {
                *act = pre.max(0.0);
            }
            weights.logits(&hidden_act, &mut logits);
            softmax_inplace(&logits, &mut probs);
            accumulate(&mut stats, &probs, target);

            d_hidden.fill(0.0);
            for c in 0..n_classes {
                let dz2 = probs[c] - target[c];
                d_b2[c] += dz2;
                let base = c * hidden;
                for h in 0..hidden {
                    d_w2[base + h] += dz2 * hidden_act[h];
                    d_hidden[h] += dz2 * weights.weights2[base + h];
                }
            }
            for h in 0..hidden {
                if hidden_pre[h] <= 0.0 {
                    continue;
                }
                d_b1[h] += d_hidden[h];
                let base = h * d;
                for i in 0..d {
                    d_w1[base + i] += d_hidden[h] * x[i];
                }
            }
        }

        let scale = learning_rate / stats.samples as f32;
        for (w, g) in weights.weights1.iter_mut().zip(&d_w1) {
            *w -= scale * (g + l2 * *w);
        }
        for (b, g) in weights.bias1.iter_mut().zip(&d_b1) {
            *b -= scale * g;
        }
        for (w, g) in weights.weights2.iter_mut().zip(&d_w2) {
            *w -= scale * (g + l2 * *w);
        }
        for (b, g) in weights.bias2.iter_mut().zip(&d_b2) {
            *b -= scale * g;
        }
        Ok(stats)
    }

    fn predict_proba(&self, images: ArrayView4<'_, f32>) -> Result<Array2<f32>, ModelError> {
        let weights = self.prepared()?;
        Self::check_images(weights, images.shape())?;
        let n = images.len_of(Axis(0));
        let mut out = Array2::<f32>::zeros((n, weights.n_classes));
        let mut hidden_act = vec![0.0f32; weights.hidden_size];
        let mut logits = vec![0.0f32; weights.n_classes];
        let mut probs = vec![0.0f32; weights.n_classes];
        for (i, image) in images.axis_iter(Axis(0)).enumerate() {
            let x: Vec<f32> = image.iter().copied().collect();
            weights.hidden_pre(&x, &mut hidden_act);
            hidden_act.iter_mut().for_each(|v| *v = v.max(0.0));
            weights.logits(&hidden_act, &mut logits);
            softmax_inplace(&logits, &mut probs);
            for (c, &p) in probs.iter().enumerate() {
                out[[i, c]] = p;
            }
        }
        Ok(out)
    }

    fn save(&self, path: &Path) -> Result<(), ModelError> {
        let weights = self.prepared()?;
        let file = File::create(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, weights).map_err(|source| ModelError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn accumulate(stats: &mut BatchStats, probs: &[f32], target: ArrayView1<'_, f32>) {
    let truth = argmax(target.iter().copied());
    let predicted = argmax(probs.iter().copied());
    stats.loss_sum += -(probs[truth].max(1e-7)).ln();
    stats.correct += usize::from(truth == predicted);
    stats.samples += 1;
}

fn argmax(values: impl Iterator<Item = f32>) -> usize {
    let mut best = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, v) in values.enumerate() {
        if v > best_val {
            best_val = v;
            best = idx;
        }
    }
    best
}

fn softmax_inplace(raw: &[f32], out: &mut [f32]) {
    if raw.is_empty() || out.is_empty() {
        return;
    }
    let max = raw
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, |a, b| a.max(b));
    let mut sum = 0.0f32;
    for (i, &v) in raw.iter().enumerate() {
        let e = (v - max).exp();
        out[i] = e;
        sum += e;
    }
    if sum == 0.0 || !sum.is_finite() {
        let uniform = 1.0 / (raw.len() as f32);
        out.iter_mut().for_each(|v| *v = uniform);
        return;
    }
    for v in out.iter_mut() {
        *v /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use tempfile::tempdir;

    fn shape() -> InputShape {
        InputShape {
            height: 2,
            width: 2,
            channels: 1,
        }
    }

    /// Bright images are class 1, dark images class 0.
    fn toy_batch() -> Batch {
        let images = Array4::from_shape_fn((8, 2, 2, 1), |(i, _, _, _)| {
            if i % 2 == 0 { 0.1 } else { 0.9 }
        });
        let labels = Array2::from_shape_fn((8, 2), |(i, c)| if i % 2 == c { 1.0 } else { 0.0 });
        Batch { images, labels }
    }

    #[test]
    fn probabilities_sum_to_one() {
        let mut model = MlpClassifier::new(MlpOptions::default());
        model.prepare(shape(), 3).unwrap();
        let proba = model.predict_proba(toy_batch().images.view()).unwrap();
        assert_eq!(proba.dim(), (8, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn training_reduces_loss_on_separable_batch() {
        let mut model = MlpClassifier::new(MlpOptions {
            hidden_size: 8,
            learning_rate: 0.5,
            ..MlpOptions::default()
        });
        model.prepare(shape(), 2).unwrap();
        let batch = toy_batch();
        let first = model.train_batch(&batch).unwrap();
        let mut last = first;
        for _ in 0..200 {
            last = model.train_batch(&batch).unwrap();
        }
        assert!(last.loss_sum < first.loss_sum);
        assert_eq!(last.correct, 8);
    }

    #[test]
    fn unprepared_model_refuses_work() {
        let model = MlpClassifier::new(MlpOptions::default());
        assert!(matches!(
            model.predict_proba(toy_batch().images.view()),
            Err(ModelError::NotPrepared)
        ));
        assert!(!model.is_prepared());
    }

    #[test]
    fn wrong_input_shape_is_rejected() {
        let mut model = MlpClassifier::new(MlpOptions::default());
        model
            .prepare(
                InputShape {
                    height: 3,
                    width: 3,
                    channels: 1,
                },
                2,
            )
            .unwrap();
        let err = model.train_batch(&toy_batch()).unwrap_err();
        assert!(matches!(err, ModelError::InputShape { .. }));
    }

    #[test]
    fn saved_weights_load_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut model = MlpClassifier::new(MlpOptions::default());
        model.prepare(shape(), 2).unwrap();
        model.save(&path).unwrap();

        let loaded = MlpClassifier::load(&path, MlpOptions::default()).unwrap();
        assert_eq!(loaded.weights(), model.weights());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn buffered_write_failure_is_reported() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        // Small enough that every byte sits in the write buffer until flush.
        let mut model = MlpClassifier::new(MlpOptions {
            hidden_size: 2,
            ..MlpOptions::default()
        });
        model.prepare(shape(), 2).unwrap();
        let err = model.save(full).unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }), "{err}");
    }
}
