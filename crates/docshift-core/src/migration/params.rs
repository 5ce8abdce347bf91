//! Parameter resolution for change set bodies.
//!
//! A body is any `Fn` taking up to four [`Param`] arguments. Each argument
//! is resolved right before the call from a fixed table: the live database
//! ([`Db`]) and the caller-supplied singletons ([`Inject`]). A parameter
//! that cannot be resolved fails the change set with
//! [`ChangeSetError::UnsupportedParameter`].

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use super::error::ChangeSetError;
use crate::store::{DatabaseHandle, DocumentDatabase};

/// Type-keyed singletons available to change set bodies.
#[derive(Clone, Default)]
pub struct ChangeParams {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ChangeParams {
    /// Create an empty parameter table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a singleton, replacing any previous value of the same type.
    pub fn with<T: Any + Send + Sync>(self, value: T) -> Self {
        self.with_shared(Arc::new(value))
    }

    /// Register an already shared singleton.
    pub fn with_shared<T: Any + Send + Sync>(mut self, value: Arc<T>) -> Self {
        self.values.insert(TypeId::of::<T>(), value);
        self
    }

    /// Look up a singleton by type.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let value = Arc::clone(self.values.get(&TypeId::of::<T>())?);
        value.downcast::<T>().ok()
    }

    /// Number of registered singletons.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no singleton is registered.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ChangeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeParams")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Resolution context for one body invocation.
pub struct ParamResolver<'a> {
    change_id: &'a str,
    method: &'a str,
    database: &'a DatabaseHandle,
    params: &'a ChangeParams,
}

impl<'a> ParamResolver<'a> {
    /// Create a resolver for the given change set.
    pub fn new(
        change_id: &'a str,
        method: &'a str,
        database: &'a DatabaseHandle,
        params: &'a ChangeParams,
    ) -> Self {
        Self {
            change_id,
            method,
            database,
            params,
        }
    }

    /// The live database handle.
    pub fn database(&self) -> &DatabaseHandle {
        self.database
    }

    /// A caller-supplied singleton.
    pub fn singleton<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.params.get::<T>()
    }

    fn resolve<P: Param>(&self) -> Result<P, ChangeSetError> {
        P::resolve(self).ok_or_else(|| ChangeSetError::UnsupportedParameter {
            change_set: self.method.to_string(),
            type_name: P::type_name(),
        })
    }

    fn body_failed(&self, message: String) -> ChangeSetError {
        ChangeSetError::Body {
            change_id: self.change_id.to_string(),
            message,
        }
    }
}

/// A value a change set body can declare as an argument.
pub trait Param: Sized {
    /// Resolve the value, or `None` if it is not available.
    fn resolve(resolver: &ParamResolver<'_>) -> Option<Self>;

    /// Type name reported when resolution fails.
    fn type_name() -> &'static str {
        type_name::<Self>()
    }
}

/// The database the migration runs against.
#[derive(Clone)]
pub struct Db(pub DatabaseHandle);

impl Deref for Db {
    type Target = dyn DocumentDatabase;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Param for Db {
    fn resolve(resolver: &ParamResolver<'_>) -> Option<Self> {
        Some(Db(Arc::clone(resolver.database())))
    }
}

/// A singleton registered through [`ChangeParams`].
pub struct Inject<T>(pub Arc<T>);

impl<T> Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Any + Send + Sync> Param for Inject<T> {
    fn resolve(resolver: &ParamResolver<'_>) -> Option<Self> {
        resolver.singleton::<T>().map(Inject)
    }

    fn type_name() -> &'static str {
        type_name::<T>()
    }
}

/// Return values accepted from a body.
pub trait ChangeOutcome {
    /// Convert into the error text recorded on failure.
    fn into_outcome(self) -> Result<(), String>;
}

impl ChangeOutcome for () {
    fn into_outcome(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: fmt::Display> ChangeOutcome for Result<(), E> {
    fn into_outcome(self) -> Result<(), String> {
        self.map_err(|e| e.to_string())
    }
}

/// A callable change set body taking the parameters `Args`.
pub trait ChangeBody<Args>: Send + Sync + 'static {
    /// Resolve the parameters and run the body.
    fn call(&self, resolver: &ParamResolver<'_>) -> Result<(), ChangeSetError>;
}

macro_rules! impl_change_body {
    ($($param:ident),*) => {
        impl<F, R, $($param,)*> ChangeBody<($($param,)*)> for F
        where
            F: Fn($($param),*) -> R + Send + Sync + 'static,
            R: ChangeOutcome,
            $($param: Param,)*
        {
            #[allow(non_snake_case)]
            fn call(&self, resolver: &ParamResolver<'_>) -> Result<(), ChangeSetError> {
                $(let $param = resolver.resolve::<$param>()?;)*
                (self)($($param),*)
                    .into_outcome()
                    .map_err(|message| resolver.body_failed(message))
            }
        }
    };
}

impl_change_body!();
impl_change_body!(A);
impl_change_body!(A, B);
impl_change_body!(A, B, C);
impl_change_body!(A, B, C, D);

/// Type-erased body stored on a change set.
pub(crate) trait ErasedBody: Send + Sync {
    fn call(&self, resolver: &ParamResolver<'_>) -> Result<(), ChangeSetError>;
}

pub(crate) struct BodyFn<F, Args> {
    body: F,
    _args: PhantomData<fn() -> Args>,
}

impl<F, Args> BodyFn<F, Args> {
    pub(crate) fn new(body: F) -> Self {
        Self {
            body,
            _args: PhantomData,
        }
    }
}

impl<F, Args> ErasedBody for BodyFn<F, Args>
where
    F: ChangeBody<Args>,
    Args: 'static,
{
    fn call(&self, resolver: &ParamResolver<'_>) -> Result<(), ChangeSetError> {
        self.body.call(resolver)
    }
}
