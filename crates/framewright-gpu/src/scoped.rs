//! Move-only ownership of values that need explicit release.
//!
//! Vulkan handles are plain `Copy` integers, so nothing stops two owners
//! from destroying the same object. [`Scoped`] pairs a value with the
//! strategy that releases it and is itself not `Clone`, which gives the
//! value a single owner. A value equal to `T::default()` (the null handle)
//! is never released.

use std::fmt;
use std::ops::Deref;

/// Strategy that releases a value of type `T`.
pub trait Release<T> {
    /// Release `value`. Never called with `T::default()`.
    fn release(&self, value: T);
}

impl<T, F: Fn(T)> Release<T> for F {
    fn release(&self, value: T) {
        self(value);
    }
}

/// Single owner of a value plus the strategy that releases it on drop.
pub struct Scoped<T, R>
where
    T: Default + PartialEq,
    R: Release<T>,
{
    value: T,
    releaser: R,
}

impl<T, R> Scoped<T, R>
where
    T: Default + PartialEq,
    R: Release<T>,
{
    /// Take ownership of `value`.
    pub const fn new(value: T, releaser: R) -> Self {
        Self { value, releaser }
    }

    /// Borrow the owned value.
    #[inline]
    pub const fn get(&self) -> &T {
        &self.value
    }

    /// Mutably borrow one part of the owned value.
    ///
    /// The value as a whole is only swapped through
    /// [`replace`](Self::replace), which releases the previous one.
    #[inline]
    pub fn project_mut<U>(&mut self, project: fn(&mut T) -> &mut U) -> &mut U {
        project(&mut self.value)
    }

    /// Whether the owned value is the null sentinel.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.value == T::default()
    }

    /// The release strategy.
    #[inline]
    pub const fn releaser(&self) -> &R {
        &self.releaser
    }

    /// Give up ownership without releasing.
    pub fn take(mut self) -> T {
        std::mem::take(&mut self.value)
    }

    /// Release the current value now and leave the null sentinel behind.
    pub fn reset(&mut self) {
        let value = std::mem::take(&mut self.value);
        if value != T::default() {
            self.releaser.release(value);
        }
    }

    /// Release the current value and take ownership of `value`.
    pub fn replace(&mut self, value: T) {
        self.reset();
        self.value = value;
    }
}

impl<T, R> Deref for Scoped<T, R>
where
    T: Default + PartialEq,
    R: Release<T>,
{
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, R> Drop for Scoped<T, R>
where
    T: Default + PartialEq,
    R: Release<T>,
{
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T, R> fmt::Debug for Scoped<T, R>
where
    T: Default + PartialEq + fmt::Debug,
    R: Release<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scoped").field(&self.value).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn releases_once_on_drop() {
        let released = RefCell::new(Vec::new());
        {
            let _scoped = Scoped::new(7_u64, |v: u64| released.borrow_mut().push(v));
        }
        assert_eq!(*released.borrow(), vec![7]);
    }

    #[test]
    fn null_value_is_never_released() {
        let released = RefCell::new(Vec::new());
        {
            let scoped = Scoped::new(0_u64, |v: u64| released.borrow_mut().push(v));
            assert!(scoped.is_null());
        }
        assert!(released.borrow().is_empty());
    }

    #[test]
    fn take_moves_ownership_out() {
        let released = RefCell::new(Vec::new());
        let scoped = Scoped::new(3_u64, |v: u64| released.borrow_mut().push(v));
        assert_eq!(scoped.take(), 3);
        assert!(released.borrow().is_empty());
    }

    #[test]
    fn replace_releases_previous_value() {
        let released = RefCell::new(Vec::new());
        {
            let mut scoped = Scoped::new(1_u64, |v: u64| released.borrow_mut().push(v));
            scoped.replace(2);
            assert_eq!(*scoped, 2);
        }
        assert_eq!(*released.borrow(), vec![1, 2]);
    }

    #[derive(Debug, Default, PartialEq)]
    struct Slot {
        handle: u64,
        writes: u32,
    }

    #[test]
    fn projected_edits_keep_the_owned_handle() {
        let released = RefCell::new(Vec::new());
        {
            let mut scoped = Scoped::new(Slot { handle: 4, writes: 0 }, |v: Slot| {
                released.borrow_mut().push(v);
            });
            *scoped.project_mut(|slot| &mut slot.writes) += 2;
            assert_eq!(scoped.handle, 4);
        }
        assert_eq!(*released.borrow(), vec![Slot { handle: 4, writes: 2 }]);
    }

    #[test]
    fn moving_transfers_the_single_release() {
        let released = RefCell::new(Vec::new());
        {
            let first = Scoped::new(5_u64, |v: u64| released.borrow_mut().push(v));
            let second = first;
            assert_eq!(*second.get(), 5);
        }
        assert_eq!(*released.borrow(), vec![5]);
    }
}
