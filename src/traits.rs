use sparsetools::csc::CSC;
use spsolve::Solver;

/// Sparse direct solver used to factorize the reduced susceptance matrix.
pub trait LinearSolver: Sync {
    /// Solves `A x = b`, overwriting `b` with `x`.
    fn solve(&self, a_mat: &CSC<usize, f64>, b: &mut [f64]) -> Result<(), String>;
}

impl<S> LinearSolver for S
where
    S: Solver<usize, f64> + Sync,
{
    fn solve(&self, a_mat: &CSC<usize, f64>, b: &mut [f64]) -> Result<(), String> {
        Solver::solve(
            self,
            a_mat.cols(),
            a_mat.rowidx(),
            a_mat.colptr(),
            a_mat.values(),
            b,
            false,
        )
        .map_err(|err| err.to_string())
    }
}
