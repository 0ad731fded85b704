use nalgebra::{Matrix3, SMatrix, SymmetricEigen};

/// Smallest variance a repaired covariance is allowed to have.
pub const MINIMUM_VARIANCE: f32 = 1e-6;
const SYMMETRY_TOLERANCE: f32 = 1e-4;
const EIGENVALUE_TOLERANCE: f32 = 1e-6;

pub fn symmetrize<const DIMENSION: usize>(
    matrix: SMatrix<f32, DIMENSION, DIMENSION>,
) -> SMatrix<f32, DIMENSION, DIMENSION> {
    (matrix + matrix.transpose()) * 0.5
}

pub fn is_symmetric<const DIMENSION: usize>(matrix: &SMatrix<f32, DIMENSION, DIMENSION>) -> bool {
    let scale = matrix.amax().max(1.0);
    (matrix - matrix.transpose()).amax() <= SYMMETRY_TOLERANCE * scale
}

/// Finite, symmetric and without eigenvalues below `-EIGENVALUE_TOLERANCE`.
pub fn is_positive_semi_definite<const DIMENSION: usize>(
    matrix: &SMatrix<f32, DIMENSION, DIMENSION>,
) -> bool {
    if matrix.iter().any(|value| !value.is_finite()) || !is_symmetric(matrix) {
        return false;
    }
    let scale = matrix.amax().max(1.0);
    let shifted = symmetrize(*matrix)
        + SMatrix::<f32, DIMENSION, DIMENSION>::identity() * (EIGENVALUE_TOLERANCE * scale);
    shifted.cholesky().is_some()
}

/// Nearest symmetric matrix whose eigenvalues are at least `MINIMUM_VARIANCE`.
pub fn repair_covariance(covariance: Matrix3<f32>) -> Matrix3<f32> {
    let symmetric = symmetrize(covariance);
    if symmetric.iter().any(|value| !value.is_finite()) {
        return Matrix3::identity() * MINIMUM_VARIANCE;
    }
    let mut decomposition = SymmetricEigen::new(symmetric);
    decomposition
        .eigenvalues
        .apply(|eigenvalue| *eigenvalue = eigenvalue.max(MINIMUM_VARIANCE));
    symmetrize(decomposition.recompose())
}
