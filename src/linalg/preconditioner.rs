//! Preconditioners for the iterative linear solver
//!
//! All three variants accepted by the configuration live here, selected
//! through [`PreconditionerKind`]. The coupled Jacobian is non-symmetric
//! with block structure, so ILU(0) is the default; Jacobi and identity
//! remain available for experiments and debugging.

use sprs::CsMat;

use crate::error::{Result, SimulatorError};

/// Approximately solves M z = r with M ≈ A.
pub trait Preconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64>;
}

/// Preconditioner selection parsed from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionerKind {
    None,
    Jacobi,
    Ilu0,
}

impl PreconditionerKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "none" => Ok(PreconditionerKind::None),
            "jacobi" => Ok(PreconditionerKind::Jacobi),
            "ilu0" => Ok(PreconditionerKind::Ilu0),
            other => Err(SimulatorError::Configuration(format!(
                "unknown preconditioner \"{}\" (expected \"none\", \"jacobi\" or \"ilu0\")",
                other
            ))),
        }
    }

    /// Build the preconditioner for one matrix. ILU(0) factorization can
    /// hit a zero pivot; that failure surfaces as a recoverable linear
    /// solver error.
    #[allow(non_snake_case)]
    pub fn build(self, A: &CsMat<f64>) -> Result<Box<dyn Preconditioner>> {
        match self {
            PreconditionerKind::None => Ok(Box::new(IdentityPreconditioner)),
            PreconditionerKind::Jacobi => Ok(Box::new(JacobiPreconditioner::new(A))),
            PreconditionerKind::Ilu0 => Ok(Box::new(ILUPreconditioner::new(A)?)),
        }
    }
}

/// Jacobi (diagonal) preconditioner: M = diag(A).
pub struct JacobiPreconditioner {
    /// Inverse of diagonal entries: 1/A_ii
    diag_inv: Vec<f64>,
}

impl JacobiPreconditioner {
    #[allow(non_snake_case)]
    pub fn new(A: &CsMat<f64>) -> Self {
        let n = A.rows();
        let mut diag_inv = vec![1.0; n];
        for i in 0..n {
            if let Some(&val) = A.get(i, i) {
                if val.abs() > 1e-14 {
                    diag_inv[i] = 1.0 / val;
                }
            }
        }
        Self { diag_inv }
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64> {
        r.iter()
            .zip(self.diag_inv.iter())
            .map(|(&ri, &di)| ri * di)
            .collect()
    }
}

/// Identity preconditioner (no preconditioning)
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64> {
        r.to_vec()
    }
}

/// Incomplete LU preconditioner with zero fill-in (ILU(0))
///
/// M = L * U ≈ A with L and U restricted to the sparsity pattern of A.
/// The factors are stored as raw CSR arrays so both factorization and the
/// triangular solves run over plain slices.
#[derive(Debug)]
pub struct ILUPreconditioner {
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
    /// Position of each row's diagonal entry within `data`.
    diag: Vec<usize>,
    n: usize,
}

impl ILUPreconditioner {
    #[allow(non_snake_case)]
    pub fn new(A: &CsMat<f64>) -> Result<Self> {
        let n = A.rows();
        let mut indptr = Vec::with_capacity(n + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for row in A.outer_iterator() {
            for (col, &val) in row.iter() {
                indices.push(col);
                data.push(val);
            }
            indptr.push(indices.len());
        }

        let mut diag = vec![0usize; n];
        for i in 0..n {
            let row = &indices[indptr[i]..indptr[i + 1]];
            match row.iter().position(|&c| c == i) {
                Some(p) => diag[i] = indptr[i] + p,
                None => {
                    return Err(SimulatorError::LinearSolve(format!(
                        "ILU(0): row {} has no diagonal entry",
                        i
                    )))
                }
            }
        }

        Self::factorize(&indptr, &indices, &mut data, &diag)?;
        Ok(Self {
            indptr,
            indices,
            data,
            diag,
            n,
        })
    }

    fn factorize(
        indptr: &[usize],
        indices: &[usize],
        data: &mut [f64],
        diag: &[usize],
    ) -> Result<()> {
        let n = indptr.len() - 1;
        for i in 0..n {
            // Eliminate with previous rows k < i
            for k_idx in indptr[i]..diag[i] {
                let k = indices[k_idx];
                let pivot = data[diag[k]];
                if pivot.abs() < 1e-15 {
                    return Err(SimulatorError::LinearSolve(format!(
                        "ILU(0): zero pivot in row {}",
                        k
                    )));
                }
                let factor = data[k_idx] / pivot;
                data[k_idx] = factor;

                // A(i, j) -= A(i, k) * A(k, j) for j > k, merge-style over
                // the sorted CSR column indices
                let mut cur = k_idx + 1;
                let row_end = indptr[i + 1];
                for kj in diag[k] + 1..indptr[k + 1] {
                    let col = indices[kj];
                    while cur < row_end && indices[cur] < col {
                        cur += 1;
                    }
                    if cur == row_end {
                        break;
                    }
                    if indices[cur] == col {
                        data[cur] -= factor * data[kj];
                    }
                }
            }
            if data[diag[i]].abs() < 1e-15 {
                return Err(SimulatorError::LinearSolve(format!(
                    "ILU(0): zero pivot in row {}",
                    i
                )));
            }
        }
        Ok(())
    }
}

impl Preconditioner for ILUPreconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64> {
        let mut z = r.to_vec();

        // Forward solve L y = r (unit diagonal, entries before the diagonal)
        for i in 0..self.n {
            let mut sum = 0.0;
            for idx in self.indptr[i]..self.diag[i] {
                sum += self.data[idx] * z[self.indices[idx]];
            }
            z[i] -= sum;
        }

        // Backward solve U x = y (diagonal and entries after it)
        for i in (0..self.n).rev() {
            let mut sum = 0.0;
            for idx in self.diag[i] + 1..self.indptr[i + 1] {
                sum += self.data[idx] * z[self.indices[idx]];
            }
            z[i] = (z[i] - sum) / self.data[self.diag[i]];
        }

        z
    }
}
