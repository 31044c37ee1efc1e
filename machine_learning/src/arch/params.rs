use std::mem;

use crate::{MlErr, Result};

/// Hands out consecutive parameter slices to the layers of a model, in the
/// same order they are laid out in the flat parameter buffer.
pub struct FrontIter<'p> {
    params: &'p [f32],
}

impl<'p> FrontIter<'p> {
    /// Creates a new `FrontIter` over the whole parameter buffer.
    pub fn new(params: &'p [f32]) -> Self {
        Self { params }
    }

    /// Takes the next `n` parameters.
    ///
    /// # Arguments
    /// * `n` - The amount of parameters to take.
    ///
    /// # Returns
    /// A slice of parameters or an error if there are not enough left.
    pub fn take(&mut self, n: usize) -> Result<&'p [f32]> {
        if n > self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: self.params.len(),
                expected: n,
            });
        }

        let (head, tail) = self.params.split_at(n);
        self.params = tail;
        Ok(head)
    }

    /// Checks that every parameter was handed out.
    pub fn finish(self) -> Result<()> {
        match self.params.len() {
            0 => Ok(()),
            left => Err(MlErr::SizeMismatch {
                what: "parameters",
                got: left,
                expected: 0,
            }),
        }
    }
}

/// The mutable version of `FrontIter`, used when writing the initial parameters.
pub struct FrontIterMut<'p> {
    params: &'p mut [f32],
}

impl<'p> FrontIterMut<'p> {
    /// Creates a new `FrontIterMut` over the whole parameter buffer.
    pub fn new(params: &'p mut [f32]) -> Self {
        Self { params }
    }

    /// Takes the next `n` parameters.
    ///
    /// # Returns
    /// A mutable slice of parameters or an error if there are not enough left.
    pub fn take(&mut self, n: usize) -> Result<&'p mut [f32]> {
        if n > self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: self.params.len(),
                expected: n,
            });
        }

        let params = mem::take(&mut self.params);
        let (head, tail) = params.split_at_mut(n);
        self.params = tail;
        Ok(head)
    }

    /// Checks that every parameter was handed out.
    pub fn finish(self) -> Result<()> {
        match self.params.len() {
            0 => Ok(()),
            left => Err(MlErr::SizeMismatch {
                what: "parameters",
                got: left,
                expected: 0,
            }),
        }
    }
}

/// Walks the parameters and their gradient from the last layer to the first one,
/// which is the order the backward pass needs them in.
pub struct BackIter<'p> {
    params: &'p [f32],
    grad: &'p mut [f32],
}

impl<'p> BackIter<'p> {
    /// Creates a new `BackIter`.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - The gradient buffer, it must be as long as `params`.
    pub fn new(params: &'p [f32], grad: &'p mut [f32]) -> Result<Self> {
        if params.len() != grad.len() {
            return Err(MlErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: params.len(),
            });
        }

        Ok(Self { params, grad })
    }

    /// Takes the last `n` parameters with their gradient.
    ///
    /// # Returns
    /// A tuple of (params, grad) or an error if there are not enough left.
    pub fn take(&mut self, n: usize) -> Result<(&'p [f32], &'p mut [f32])> {
        let len = self.params.len();

        if n > len {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: len,
                expected: n,
            });
        }

        let (params_head, params_tail) = self.params.split_at(len - n);
        self.params = params_head;

        let grad = mem::take(&mut self.grad);
        let (grad_head, grad_tail) = grad.split_at_mut(len - n);
        self.grad = grad_head;

        Ok((params_tail, grad_tail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_iterator() {
        let params = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mut front = FrontIter::new(&params);

        assert_eq!(front.take(1).unwrap(), [1.0]);
        assert_eq!(front.take(3).unwrap(), [2.0, 3.0, 4.0]);
        assert!(front.take(2).is_err());
        assert_eq!(front.take(1).unwrap(), [5.0]);
        assert!(front.finish().is_ok());
    }

    #[test]
    fn unfinished_front_iterator_fails() {
        let params = [1.0, 2.0];
        let mut front = FrontIter::new(&params);
        front.take(1).unwrap();

        assert!(front.finish().is_err());
    }

    #[test]
    fn front_iterator_mut_writes_in_place() {
        let mut params = [0.0; 4];
        let mut front = FrontIterMut::new(&mut params);

        front.take(1).unwrap().fill(1.0);
        front.take(3).unwrap().fill(2.0);
        front.finish().unwrap();

        assert_eq!(params, [1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn back_iterator() {
        let params = [1.0, 2.0, 3.0, 4.0];
        let mut grad = [0.0; 4];
        let mut back = BackIter::new(&params, &mut grad).unwrap();

        let (p, g) = back.take(1).unwrap();
        assert_eq!(p, [4.0]);
        g[0] = 40.0;

        let (p, g) = back.take(3).unwrap();
        assert_eq!(p, [1.0, 2.0, 3.0]);
        g.copy_from_slice(&[10.0, 20.0, 30.0]);

        assert!(back.take(1).is_err());
        assert_eq!(grad, [10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn back_iterator_needs_matching_grad() {
        let params = [1.0, 2.0];
        let mut grad = [0.0; 3];
        assert!(BackIter::new(&params, &mut grad).is_err());
    }
}
