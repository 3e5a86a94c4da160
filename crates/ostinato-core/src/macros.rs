//! Boilerplate macros for [`Recall`](crate::Recall) implementations.

/// Implements the `effect`, `as_any` and `as_any_mut` methods of
/// [`Recall`](crate::Recall).
///
/// # Example
/// ```ignore
/// #[derive(Clone)]
/// struct Gain { amount: f32 }
///
/// impl Recall for Gain {
///     recall_any!("gain");
///
///     fn run_inter(&mut self, cx: &mut StageContext<'_>) { /* ... */ }
/// }
/// ```
#[macro_export]
macro_rules! recall_any {
    ($effect:expr) => {
        fn effect(&self) -> &'static str {
            $effect
        }

        fn as_any(&self) -> &dyn ::core::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
            self
        }
    };
}
