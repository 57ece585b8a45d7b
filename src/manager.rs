//! The factory contract a pool drives resources through.

use std::future::Future;

/// Constructor/destructor pair for a pooled resource type.
///
/// The pool treats both callbacks as opaque: it never inspects a resource
/// between borrows, and anything handed back through the normal return path
/// is assumed reusable. Callers signal a broken resource by destroying it
/// (see [`PooledResource::destroy`](crate::PooledResource::destroy)) instead
/// of letting it return.
///
/// Both callbacks may take arbitrarily long; the pool always invokes them
/// outside its internal locks.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use striped_pool::ManageResource;
///
/// struct Session(usize);
///
/// #[derive(Default)]
/// struct SessionManager {
///     next: AtomicUsize,
/// }
///
/// impl ManageResource for SessionManager {
///     type Resource = Session;
///     type Error = std::io::Error;
///
///     async fn create(&self) -> Result<Self::Resource, Self::Error> {
///         Ok(Session(self.next.fetch_add(1, Ordering::Relaxed)))
///     }
///
///     async fn destroy(&self, _session: Self::Resource) -> Result<(), Self::Error> {
///         // Dropping the session is enough.
///         Ok(())
///     }
/// }
/// ```
pub trait ManageResource: Send + Sync + 'static {
    /// The pooled resource type.
    type Resource: Send + 'static;

    /// Error produced by a failed creation or destruction.
    ///
    /// Creation errors propagate to the `take` caller unchanged. Destruction
    /// errors are always swallowed by the pool so that one failing destructor
    /// cannot disturb pool bookkeeping or the destruction of other resources.
    type Error: Send + 'static;

    /// Construct a fresh resource.
    fn create(&self) -> impl Future<Output = Result<Self::Resource, Self::Error>> + Send;

    /// Tear down a resource that is leaving the pool for good.
    fn destroy(&self, resource: Self::Resource)
        -> impl Future<Output = Result<(), Self::Error>> + Send;
}
