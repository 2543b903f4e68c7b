use crate::request::MultiTargetParameters;
use std::ops::{Deref, Range};

/// Exclusive access to a multi-target descriptor while its id list is swapped chunk by chunk.
///
/// The full list is captured on construction and written back when the guard drops, so the
/// caller's descriptor is restored after success, an early `?` return, cancellation or a panic.
pub struct ObjectIdsGuard<'a, P: MultiTargetParameters + ?Sized> {
    params: &'a mut P,
    original: Vec<i32>,
}

impl<'a, P: MultiTargetParameters + ?Sized> ObjectIdsGuard<'a, P> {
    pub fn new(params: &'a mut P) -> Self {
        let original = params.object_ids().to_vec();
        Self { params, original }
    }

    /// The id list as it was before the first chunk was installed.
    pub fn original(&self) -> &[i32] {
        &self.original
    }

    /// Point the descriptor at `range` of the original ids.
    pub fn install(&mut self, range: Range<usize>) {
        let chunk = self.original[range].to_vec();
        self.params.set_object_ids(chunk);
    }
}

impl<P: MultiTargetParameters + ?Sized> Deref for ObjectIdsGuard<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        &*self.params
    }
}

impl<P: MultiTargetParameters + ?Sized> Drop for ObjectIdsGuard<'_, P> {
    fn drop(&mut self) {
        self.params.set_object_ids(std::mem::take(&mut self.original));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CommandParameters, RequestParameters};

    #[test]
    fn test_restores_on_drop() {
        let mut params = CommandParameters::new("api/pause.htm", vec![1, 2, 3, 4]);
        {
            let mut guard = ObjectIdsGuard::new(&mut params);
            guard.install(2..4);
            assert_eq!(guard.object_ids(), &[3, 4]);
            assert_eq!(guard.original(), &[1, 2, 3, 4]);
        }
        assert_eq!(params.object_ids(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_restores_on_panic() {
        let mut params = CommandParameters::new("api/pause.htm", vec![7, 8, 9]);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut guard = ObjectIdsGuard::new(&mut params);
            guard.install(0..1);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(params.object_ids(), &[7, 8, 9]);
    }

    #[test]
    fn test_installed_chunk_reaches_query() {
        let mut params = CommandParameters::new("api/pause.htm", vec![10, 20, 30]);
        let mut guard = ObjectIdsGuard::new(&mut params);
        guard.install(1..3);
        assert_eq!(guard.query()[0], ("id".to_string(), "20,30".to_string()));
    }
}
