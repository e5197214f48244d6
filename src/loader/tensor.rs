use crate::error::{LoaderError, Result};

/// Dense row-major `f32` tensor
///
/// A minimal container for transformed records. Per-record tensors produced by a
/// [`Transform`] are stacked along a new leading axis to form a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}
impl Tensor {
    /// Creates a tensor, checking that `data` fills `shape` exactly
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(LoaderError::InvalidTensor {
                shape,
                expected,
                got: data.len(),
            }
            .into());
        }
        Ok(Self { shape, data })
    }

    /// Creates a one-dimensional tensor
    #[must_use]
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Total number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Slice of the `i`-th entry along the leading axis
    #[must_use]
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        let rows = *self.shape.first()?;
        if i >= rows {
            return None;
        }
        let width = self.data.len() / rows;
        Some(&self.data[i * width..(i + 1) * width])
    }

    /// Stacks equally shaped tensors along a new leading axis
    ///
    /// Stacking tensors of shape `[d0, d1]` yields shape `[n, d0, d1]`.
    pub fn stack(tensors: &[Tensor]) -> Result<Self> {
        let Some(first) = tensors.first() else {
            return Ok(Self {
                shape: vec![0],
                data: Vec::new(),
            });
        };
        let mut data = Vec::with_capacity(first.len() * tensors.len());
        for tensor in tensors {
            if tensor.shape != first.shape {
                return Err(LoaderError::ShapeMismatch {
                    expected: first.shape.clone(),
                    got: tensor.shape.clone(),
                }
                .into());
            }
            data.extend_from_slice(&tensor.data);
        }
        let mut shape = Vec::with_capacity(first.shape.len() + 1);
        shape.push(tensors.len());
        shape.extend_from_slice(&first.shape);
        Ok(Self { shape, data })
    }
}

/// Converts a decoded sequence into a fixed-shape tensor
///
/// Implementations must return the same shape for every record of a container,
/// otherwise batches fail to stack. Any closure with the matching signature is a
/// transform.
pub trait Transform: Send + Sync {
    fn transform(&self, sequence: &str) -> anyhow::Result<Tensor>;
}
impl<F> Transform for F
where
    F: Fn(&str) -> anyhow::Result<Tensor> + Send + Sync,
{
    fn transform(&self, sequence: &str) -> anyhow::Result<Tensor> {
        self(sequence)
    }
}
