use burn::tensor::{backend::Backend, Data, ElementConversion, Shape, Tensor};

/// Stack variable-length rows of vectors into a `[batch_size, seq_length, dim]` tensor.
///
/// Each row is a flattened sequence of `dim`-sized vectors. Rows longer than
/// `seq_length` are truncated, shorter rows are padded with zero vectors.
pub fn pad_to<B: Backend>(
    rows: Vec<Vec<f32>>,
    seq_length: usize,
    dim: usize,
    device: &B::Device,
) -> Tensor<B, 3> {
    let batch_size = rows.len();
    let row_width = seq_length * dim;

    let mut values: Vec<B::FloatElem> = Vec::with_capacity(batch_size * row_width);

    for row in rows {
        let kept = row.len().min(row_width);

        values.extend(row.into_iter().take(kept).map(|e| e.elem::<B::FloatElem>()));
        values.extend((kept..row_width).map(|_| 0.0f32.elem::<B::FloatElem>()));
    }

    Tensor::from_data(
        Data::new(values, Shape::new([batch_size, seq_length, dim])),
        device,
    )
}

/// Zero-pad one axis of a 4D tensor with `before` leading and `after` trailing slots
pub fn pad_axis<B: Backend>(
    tensor: Tensor<B, 4>,
    dim: usize,
    before: usize,
    after: usize,
) -> Tensor<B, 4> {
    if before == 0 && after == 0 {
        return tensor;
    }

    let device = tensor.device();
    let dims = tensor.dims();

    let zeros = |len: usize| {
        let mut shape = dims;
        shape[dim] = len;

        Tensor::<B, 4>::zeros(shape, &device)
    };

    let mut parts = Vec::with_capacity(3);

    if before > 0 {
        parts.push(zeros(before));
    }

    parts.push(tensor);

    if after > 0 {
        parts.push(zeros(after));
    }

    Tensor::cat(parts, dim)
}

/// Copy a float tensor back to host memory as `f32` values in row-major order
pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().convert::<f32>().value
}
