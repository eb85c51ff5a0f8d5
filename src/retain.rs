//! Intrusive reference-counted pointers
//!
//! [`RetainPtr`] does not own a count of its own: the pointee carries it, and a
//! [`RetainTraits`] policy decides how to bump it, read it and what happens
//! when the last reference goes away.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

/// Policy used by [`RetainPtr`] to manage an intrusive count.
pub trait RetainTraits<T: ?Sized> {
    /// Add one reference
    fn increment(value: &T);

    /// Drop one reference, releasing the pointee when it was the last.
    ///
    /// # Safety
    /// `ptr` must be live and the caller must own one of its references.
    unsafe fn decrement(ptr: NonNull<T>);

    /// Current number of references
    fn count(value: &T) -> u32;
}

/// How a raw pointer is taken into a [`RetainPtr`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetainMode {
    /// Take over a reference the caller already owns
    Adopt,
    /// Add a new reference
    Retain,
}

/// Shared pointer whose count lives inside the pointee.
pub struct RetainPtr<T: ?Sized, R: RetainTraits<T>> {
    ptr: Option<NonNull<T>>,
    _traits: PhantomData<R>,
}

// Safety: the count is managed atomically by the retain traits of every
// pointee used across threads, so sharing handles is as safe as sharing &T.
unsafe impl<T: ?Sized + Send + Sync, R: RetainTraits<T>> Send for RetainPtr<T, R> {}
unsafe impl<T: ?Sized + Send + Sync, R: RetainTraits<T>> Sync for RetainPtr<T, R> {}

impl<T: ?Sized, R: RetainTraits<T>> RetainPtr<T, R> {
    /// Empty handle
    pub const fn null() -> Self {
        Self {
            ptr: None,
            _traits: PhantomData,
        }
    }

    /// Wrap a raw pointer.
    ///
    /// # Safety
    /// `ptr` must point to a live value managed by `R`. With
    /// [`RetainMode::Adopt`] the caller transfers one reference it owns.
    pub unsafe fn from_raw(ptr: NonNull<T>, mode: RetainMode) -> Self {
        if mode == RetainMode::Retain {
            R::increment(ptr.as_ref());
        }
        Self {
            ptr: Some(ptr),
            _traits: PhantomData,
        }
    }

    /// Wrap a raw pointer without touching its count.
    ///
    /// # Safety
    /// See [`RetainPtr::from_raw`].
    pub unsafe fn adopt(ptr: NonNull<T>) -> Self {
        Self::from_raw(ptr, RetainMode::Adopt)
    }

    /// Wrap a raw pointer and add a reference.
    ///
    /// # Safety
    /// See [`RetainPtr::from_raw`].
    pub unsafe fn retain(ptr: NonNull<T>) -> Self {
        Self::from_raw(ptr, RetainMode::Retain)
    }

    pub fn get(&self) -> Option<&T> {
        // Safety: a non-null handle keeps its pointee alive
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Number of references to the pointee, 0 for a null handle
    pub fn count(&self) -> u32 {
        self.get().map_or(0, R::count)
    }

    /// Give up the reference without decrementing it.
    ///
    /// The caller becomes responsible for the returned reference.
    #[must_use]
    pub fn release(mut self) -> Option<NonNull<T>> {
        self.ptr.take()
    }

    /// Drop the reference held by this handle, leaving it null
    pub fn reset(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // Safety: this handle owned one reference
            unsafe { R::decrement(ptr) };
        }
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.ptr, &mut other.ptr);
    }

    /// Whether both handles point at the same value
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self.ptr, other.ptr) {
            (Some(a), Some(b)) => std::ptr::addr_eq(a.as_ptr(), b.as_ptr()),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: ?Sized, R: RetainTraits<T>> Default for RetainPtr<T, R> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized, R: RetainTraits<T>> Clone for RetainPtr<T, R> {
    fn clone(&self) -> Self {
        if let Some(value) = self.get() {
            R::increment(value);
        }
        Self {
            ptr: self.ptr,
            _traits: PhantomData,
        }
    }
}

impl<T: ?Sized, R: RetainTraits<T>> Drop for RetainPtr<T, R> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized, R: RetainTraits<T>> Deref for RetainPtr<T, R> {
    type Target = T;

    /// # Panics
    /// Dereferencing a null handle panics. Check with [`RetainPtr::get`] first
    /// when the handle may be empty.
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced a null RetainPtr"),
        }
    }
}

impl<T: ?Sized, R: RetainTraits<T>> PartialEq for RetainPtr<T, R> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: ?Sized, R: RetainTraits<T>> Eq for RetainPtr<T, R> {}

impl<T: ?Sized, R: RetainTraits<T>> Hash for RetainPtr<T, R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr
            .map(|ptr| ptr.as_ptr() as *const () as usize)
            .hash(state);
    }
}

impl<T: ?Sized, R: RetainTraits<T>> fmt::Debug for RetainPtr<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(ptr) => f
                .debug_struct("RetainPtr")
                .field("ptr", &(ptr.as_ptr() as *const ()))
                .field("count", &self.count())
                .finish(),
            None => f.write_str("RetainPtr(null)"),
        }
    }
}
