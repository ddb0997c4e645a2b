//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarMap;
use log::trace;
use rlroute_core::Obs;

/// Value written at unavailable actions in batched computations.
///
/// Finite so that `0 * value` stays zero in masked sums.
pub const MASKED_VALUE: f32 = -1e9;

/// Copies the values of the variables of `src` into the variables of `dest`
/// with the same names, moving them to the device of `dest`.
///
/// Used for the hard update of target networks and for device moves.
pub fn copy_weights(dest: &VarMap, src: &VarMap) -> Result<()> {
    trace!("copy_weights");
    let dest = dest.data().lock().map_err(|_| anyhow!("VarMap lock poisoned"))?;
    let src = src.data().lock().map_err(|_| anyhow!("VarMap lock poisoned"))?;

    for (name, v_dest) in dest.iter() {
        let v_src = src
            .get(name)
            .ok_or_else(|| anyhow!("Variable {} not found in source VarMap", name))?;
        let t = v_src.as_tensor().to_device(v_dest.device())?;
        v_dest.set(&t)?;
    }

    Ok(())
}

/// Stacks the features of observations into a `[n, dim]` tensor.
pub fn obs_tensor<O: Obs>(obs: &[O], device: &Device) -> Result<Tensor> {
    let dim = obs.first().map(|o| o.features().len()).unwrap_or(0);
    let data = obs
        .iter()
        .flat_map(|o| o.features().iter().copied())
        .collect::<Vec<_>>();
    Ok(Tensor::from_vec(data, (obs.len(), dim), device)?)
}

/// Stacks the availability masks of observations into a `[n, n_actions]` `u8` tensor.
pub fn mask_tensor<O: Obs>(obs: &[O], device: &Device) -> Result<Tensor> {
    let n_actions = obs.first().map(|o| o.available_actions().len()).unwrap_or(0);
    let data = obs
        .iter()
        .flat_map(|o| o.available_actions().iter().map(|&a| a as u8))
        .collect::<Vec<_>>();
    Ok(Tensor::from_vec(data, (obs.len(), n_actions), device)?)
}

/// Replaces entries of `xs` where `mask` is zero with [`MASKED_VALUE`].
pub fn masked_fill(xs: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let fill = Tensor::full(MASKED_VALUE, xs.dims(), xs.device())?.to_dtype(xs.dtype())?;
    Ok(mask.where_cond(xs, &fill)?)
}

/// Sets unavailable entries to negative infinity.
pub fn mask_values(values: &[f32], available: &[bool]) -> Vec<f32> {
    values
        .iter()
        .zip(available.iter())
        .map(|(&v, &a)| if a { v } else { f32::NEG_INFINITY })
        .collect()
}

/// Index of the first maximal value among `available` indices.
pub fn argmax_available(values: &[f32], available: &[usize]) -> Option<usize> {
    available.iter().copied().fold(None, |best, i| match best {
        Some(b) if values[b] >= values[i] => Some(b),
        _ => Some(i),
    })
}

/// Tensor of `f32` values of shape `[n]`.
pub fn vec_tensor(xs: &[f32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(xs, xs.len(), device)?)
}

/// Action indices as a `[n, 1]` `u32` tensor for gathering.
pub fn action_tensor(actions: &[usize], device: &Device) -> Result<Tensor> {
    let data = actions.iter().map(|&a| a as u32).collect::<Vec<_>>();
    Ok(Tensor::from_vec(data, (actions.len(), 1), device)?)
}

/// Gathers `xs[i, ixs[i]]` for a `[n, k]` tensor and `[n, 1]` indices.
pub fn gather_rows(xs: &Tensor, ixs: &Tensor) -> Result<Tensor> {
    Ok(xs.gather(ixs, D::Minus1)?.squeeze(D::Minus1)?)
}

/// Reads a scalar tensor, returning whether it is finite along with its value.
pub fn is_finite_scalar(x: &Tensor) -> Result<(bool, f32)> {
    let v = x.to_dtype(DType::F32)?.to_scalar::<f32>()?;
    Ok((v.is_finite(), v))
}
