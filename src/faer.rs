use crate::DynamicsError;
use faer::{linalg::solvers::Solve, ColRef, MatRef};
use nalgebra::{DMatrix, DVector};

/// Solves `M x = b` for a mass matrix with the [faer crate](https://docs.rs/faer/latest/faer/index.html)
///
/// Uses an LU decomposition with partial pivoting. Singular matrices show up as non-finite
/// entries in the solution.
pub fn solve_mass_matrix(matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
    let n = rhs.len();
    if matrix.nrows() != n || matrix.ncols() != n {
        return Err(DynamicsError::DimensionMismatch {
            expected: matrix.nrows(),
            actual: n,
        });
    }
    let lhs = MatRef::from_column_major_slice(matrix.as_slice(), n, n);
    let lu = lhs.partial_piv_lu();
    let solution = lu.solve(ColRef::from_slice(rhs.as_slice()).to_owned());

    let solution = DVector::from_iterator(n, solution.iter().copied());
    if solution.iter().all(|x| x.is_finite()) {
        Ok(solution)
    } else {
        Err(DynamicsError::SingularMassMatrix)
    }
}

#[cfg(test)]
mod test {
    use super::solve_mass_matrix;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    #[test]
    fn test_solve() {
        let matrix = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 0.5, 0.0, 0.5, 2.0]);
        let expected = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let solution = solve_mass_matrix(&matrix, &(&matrix * &expected)).unwrap();
        assert_relative_eq!(solution, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_singular() {
        let matrix = DMatrix::zeros(2, 2);
        assert!(solve_mass_matrix(&matrix, &DVector::from_element(2, 1.0)).is_err());
        assert!(solve_mass_matrix(&DMatrix::identity(2, 2), &DVector::zeros(3)).is_err());
    }
}
