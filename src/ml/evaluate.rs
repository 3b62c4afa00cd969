use ndarray::{ArrayView2, ArrayView4, Axis, s};

use super::metrics::{ConfusionMatrix, PerClassStats, accuracy, precision_recall_by_class};
use super::{ModelError, TrainableModel};
use crate::augment::Batch;
use crate::preprocess::argmax_rows;

const LOSS_EPS: f32 = 1e-7;

/// Loss and classification metrics over one pass of held-out data.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Mean cross-entropy.
    pub loss: f32,
    pub accuracy: f32,
    pub confusion: ConfusionMatrix,
    pub per_class: Vec<PerClassStats>,
}

#[derive(Debug)]
struct Accumulator {
    loss_sum: f64,
    confusion: ConfusionMatrix,
}

impl Accumulator {
    fn new(n_classes: usize) -> Self {
        Self {
            loss_sum: 0.0,
            confusion: ConfusionMatrix::new(n_classes),
        }
    }

    fn add(
        &mut self,
        model: &dyn TrainableModel,
        images: ArrayView4<'_, f32>,
        labels: ArrayView2<'_, f32>,
    ) -> Result<(), ModelError> {
        if labels.ncols() != self.confusion.n_classes {
            return Err(ModelError::LabelWidth {
                expected: self.confusion.n_classes,
                found: labels.ncols(),
            });
        }
        let proba = model.predict_proba(images)?;
        let truth = argmax_rows(labels);
        let predicted = argmax_rows(proba.view());
        for (row, (&t, &p)) in truth.iter().zip(&predicted).enumerate() {
            let p_true = proba.get((row, t)).copied().unwrap_or(0.0);
            self.loss_sum += f64::from(-(p_true + LOSS_EPS).ln());
            self.confusion.add(t, p);
        }
        Ok(())
    }

    fn finish(self) -> Evaluation {
        let total = self.confusion.total().max(1) as f64;
        Evaluation {
            loss: (self.loss_sum / total) as f32,
            accuracy: accuracy(&self.confusion),
            per_class: precision_recall_by_class(&self.confusion),
            confusion: self.confusion,
        }
    }
}

/// Evaluate `model` on exactly `steps` batches from `batches`.
pub fn evaluate(
    model: &dyn TrainableModel,
    batches: &mut dyn Iterator<Item = Batch>,
    steps: usize,
    n_classes: usize,
) -> Result<Evaluation, ModelError> {
    let mut acc = Accumulator::new(n_classes);
    for produced in 0..steps {
        let batch = batches.next().ok_or(ModelError::BatchesExhausted {
            produced,
            expected: steps,
        })?;
        acc.add(model, batch.images.view(), batch.labels.view())?;
    }
    Ok(acc.finish())
}

/// Evaluate `model` on in-memory arrays, `batch_size` rows at a time.
pub fn evaluate_arrays(
    model: &dyn TrainableModel,
    images: ArrayView4<'_, f32>,
    labels: ArrayView2<'_, f32>,
    batch_size: usize,
) -> Result<Evaluation, ModelError> {
    let n = images.len_of(Axis(0));
    if labels.nrows() != n {
        return Err(ModelError::Invalid(format!(
            "{n} images but {} label rows",
            labels.nrows()
        )));
    }
    let mut acc = Accumulator::new(labels.ncols());
    let batch_size = batch_size.max(1);
    let mut start = 0;
    while start < n {
        let end = (start + batch_size).min(n);
        acc.add(
            model,
            images.slice(s![start..end, .., .., ..]),
            labels.slice(s![start..end, ..]),
        )?;
        start = end;
    }
    Ok(acc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{InputShape, MlpClassifier, MlpOptions};
    use ndarray::{Array2, Array4};

    fn prepared() -> MlpClassifier {
        let mut model = MlpClassifier::new(MlpOptions::default());
        model
            .prepare(
                InputShape {
                    height: 2,
                    width: 2,
                    channels: 1,
                },
                2,
            )
            .unwrap();
        model
    }

    fn data(n: usize) -> (Array4<f32>, Array2<f32>) {
        let images = Array4::from_shape_fn((n, 2, 2, 1), |(i, y, x, _)| (i + y + x) as f32 / 10.0);
        let labels = Array2::from_shape_fn((n, 2), |(i, c)| if i % 2 == c { 1.0 } else { 0.0 });
        (images, labels)
    }

    #[test]
    fn array_evaluation_counts_every_sample() {
        let model = prepared();
        let (images, labels) = data(7);
        let eval = evaluate_arrays(&model, images.view(), labels.view(), 3).unwrap();
        assert_eq!(eval.confusion.total(), 7);
        assert_eq!(eval.per_class.len(), 2);
        assert_eq!(eval.per_class[0].support + eval.per_class[1].support, 7);
        assert!(eval.loss > 0.0);
    }

    #[test]
    fn batch_and_array_paths_agree() {
        let model = prepared();
        let (images, labels) = data(4);
        let batches = vec![
            Batch {
                images: images.slice(s![0..2, .., .., ..]).to_owned(),
                labels: labels.slice(s![0..2, ..]).to_owned(),
            },
            Batch {
                images: images.slice(s![2..4, .., .., ..]).to_owned(),
                labels: labels.slice(s![2..4, ..]).to_owned(),
            },
        ];
        let streamed = evaluate(&model, &mut batches.into_iter(), 2, 2).unwrap();
        let direct = evaluate_arrays(&model, images.view(), labels.view(), 2).unwrap();
        assert_eq!(streamed.confusion, direct.confusion);
        assert!((streamed.loss - direct.loss).abs() < 1e-6);
    }

    #[test]
    fn short_stream_is_an_error() {
        let model = prepared();
        let err = evaluate(&model, &mut std::iter::empty(), 1, 2).unwrap_err();
        assert!(matches!(err, ModelError::BatchesExhausted { produced: 0, .. }));
    }
}
