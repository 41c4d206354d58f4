//! Z-score normalisation of masked functional volumes.
//!
//! Input is the eye-orbit crop of one run, `[X, Y, Z, T]` f32.
//!
//! `normalize_volumes` applies two passes (population std, ddof=0):
//!   1. per voxel over time:    v[x,y,z,:] = (v − μ_t) / σ_t
//!   2. per volume over space:  v[:,:,:,t] = (v − μ_xyz) / σ_xyz
//! Non-finite results are set to 0.  A zero σ only removes the mean.
use ndarray::{Array4, ArrayViewMut, Axis, Dimension};

fn zscore_view<D: Dimension>(mut view: ArrayViewMut<f32, D>) -> (f32, f32) {
    let finite = || view.iter().filter(|v| v.is_finite());
    let n = finite().count();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = finite().map(|&v| v as f64).sum::<f64>() / n as f64;
    let var = finite()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    let (mean, std) = (mean as f32, var.sqrt() as f32);
    if std > 0.0 {
        view.mapv_inplace(|v| (v - mean) / std);
    } else {
        view.mapv_inplace(|v| v - mean);
    }
    (mean, std)
}

/// Z-score every voxel's time series.
pub fn zscore_over_time_inplace(vol: &mut Array4<f32>) {
    for lane in vol.lanes_mut(Axis(3)) {
        zscore_view(lane);
    }
}

/// Z-score every volume over its voxels.
pub fn zscore_per_volume_inplace(vol: &mut Array4<f32>) {
    for frame in vol.axis_iter_mut(Axis(3)) {
        zscore_view(frame);
    }
}

/// Both passes, then non-finite values set to 0.  Statistics ignore
/// non-finite samples.
pub fn normalize_volumes(vol: &mut Array4<f32>) {
    zscore_over_time_inplace(vol);
    zscore_per_volume_inplace(vol);
    vol.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    fn toy() -> Array4<f32> {
        Array4::from_shape_fn((3, 4, 2, 16), |(x, y, z, t)| {
            let phase = x as f32 * 0.9 + y as f32 * 0.4 + z as f32 * 1.7;
            (x + y) as f32 * 10.0 + (t as f32 * 0.5 + phase).sin() * (1.0 + x as f32)
        })
    }

    #[test]
    fn volumes_have_zero_mean_unit_std() {
        let mut vol = toy();
        normalize_volumes(&mut vol);
        for t in 0..vol.dim().3 {
            let frame = vol.slice(s![.., .., .., t]);
            let n = frame.len() as f64;
            let mean = frame.iter().map(|&v| v as f64).sum::<f64>() / n;
            let var = frame.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
            approx::assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-5);
            approx::assert_abs_diff_eq!(var.sqrt(), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn constant_volume_becomes_zero() {
        let mut vol = Array4::from_elem((2, 2, 2, 5), 7.0_f32);
        normalize_volumes(&mut vol);
        assert!(vol.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn nan_voxels_are_zeroed() {
        let mut vol = toy();
        vol[[0, 0, 0, 3]] = f32::NAN;
        normalize_volumes(&mut vol);
        assert!(vol.iter().all(|v| v.is_finite()));
        assert_eq!(vol[[0, 0, 0, 3]], 0.0);
        assert!(vol.slice(s![.., .., .., 3]).iter().any(|&v| v != 0.0));
    }
}
