// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    any::{Any, TypeId, type_name},
    fmt,
    hash::{Hash, Hasher},
};

use crate::{BoxError, InvocationError};

/// A dynamically typed value passed to or returned from an [`Invoker`].
pub type Value = Box<dyn Any + Send>;

/// Runtime identity and name of a type.
#[derive(Clone, Copy, Debug)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
}

impl TypeDescriptor {
    /// Describes `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Returns the type id.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the type name, for diagnostics only.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if this describes `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Positional arguments of a method call.
pub struct Args {
    member: String,
    values: Vec<Option<Value>>,
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("member", &self.member)
            .field("len", &self.values.len())
            .finish()
    }
}

impl Args {
    pub(crate) fn new(member: &str, values: Vec<Value>) -> Self {
        Self {
            member: member.to_owned(),
            values: values.into_iter().map(Some).collect(),
        }
    }

    /// Returns the number of arguments passed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no argument was passed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Takes the argument at `position` as an `A`.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::ArgumentMismatch`] if the argument is missing, was
    /// already taken, or is not an `A`. A mistyped argument stays in place.
    pub fn take<A: Any>(&mut self, position: usize) -> Result<A, InvocationError> {
        let mismatch = || InvocationError::ArgumentMismatch {
            member: self.member.clone(),
            position,
            expected: type_name::<A>(),
        };

        let slot = self.values.get_mut(position).ok_or_else(mismatch)?;
        let value = slot.take().ok_or_else(mismatch)?;
        match value.downcast::<A>() {
            Ok(value) => Ok(*value),
            Err(value) => {
                *slot = Some(value);
                Err(mismatch())
            }
        }
    }

    fn reject_extra(&self, expected: usize) -> Result<(), InvocationError> {
        if self.values.len() > expected {
            return Err(InvocationError::ArgumentMismatch {
                member: self.member.clone(),
                position: expected,
                expected: "no further argument",
            });
        }
        Ok(())
    }
}

/// Reads, writes or calls one member of a value whose type is only known at runtime.
pub trait Invoker: Send + Sync {
    /// Invokes the member on `target` with `args`.
    ///
    /// Getters take no arguments and return the member's value. Setters take the new value
    /// and return `()`. Methods take whatever they declare.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationError`] if the target or arguments have the wrong type, if
    /// the member is not accessible or ambiguous, or if the member itself fails.
    fn invoke(&self, target: &mut dyn Any, args: Vec<Value>) -> Result<Value, InvocationError>;

    /// Returns the type of the value read, written or returned by the member.
    fn value_type(&self) -> TypeDescriptor;

    /// Returns the member name.
    fn member(&self) -> &str;
}

type GetFn = Box<dyn Fn(&dyn Any) -> Option<Value> + Send + Sync>;
type SetFn = Box<dyn Fn(&mut dyn Any, &mut Args) -> Result<(), InvocationError> + Send + Sync>;
type CallFn = Box<dyn Fn(&mut dyn Any, &mut Args) -> Result<Value, InvocationError> + Send + Sync>;

fn mismatched_target(owner: TypeDescriptor) -> InvocationError {
    InvocationError::TargetMismatch { expected: owner.name() }
}

/// Reads a member.
pub struct GetterInvoker {
    owner: TypeDescriptor,
    member: String,
    value_type: TypeDescriptor,
    get: GetFn,
}

impl GetterInvoker {
    /// Creates a getter for member `member` of `T` returning an `R`.
    pub fn new<T, R>(member: impl Into<String>, get: impl Fn(&T) -> R + Send + Sync + 'static) -> Self
    where
        T: Any,
        R: Any + Send,
    {
        Self {
            owner: TypeDescriptor::of::<T>(),
            member: member.into(),
            value_type: TypeDescriptor::of::<R>(),
            get: Box::new(move |target: &dyn Any| target.downcast_ref::<T>().map(|t| Box::new(get(t)) as Value)),
        }
    }
}

impl Invoker for GetterInvoker {
    fn invoke(&self, target: &mut dyn Any, args: Vec<Value>) -> Result<Value, InvocationError> {
        Args::new(&self.member, args).reject_extra(0)?;
        (self.get)(&*target).ok_or_else(|| mismatched_target(self.owner))
    }

    fn value_type(&self) -> TypeDescriptor {
        self.value_type
    }

    fn member(&self) -> &str {
        &self.member
    }
}

/// Writes a member.
pub struct SetterInvoker {
    owner: TypeDescriptor,
    member: String,
    value_type: TypeDescriptor,
    set: SetFn,
}

impl SetterInvoker {
    /// Creates a setter for member `member` of `T` taking an `A`.
    pub fn new<T, A>(member: impl Into<String>, set: impl Fn(&mut T, A) + Send + Sync + 'static) -> Self
    where
        T: Any,
        A: Any,
    {
        let owner = TypeDescriptor::of::<T>();
        Self {
            owner,
            member: member.into(),
            value_type: TypeDescriptor::of::<A>(),
            set: Box::new(move |target: &mut dyn Any, args: &mut Args| {
                let target = target.downcast_mut::<T>().ok_or_else(|| mismatched_target(owner))?;
                set(target, args.take::<A>(0)?);
                Ok(())
            }),
        }
    }
}

impl Invoker for SetterInvoker {
    fn invoke(&self, target: &mut dyn Any, args: Vec<Value>) -> Result<Value, InvocationError> {
        let mut args = Args::new(&self.member, args);
        args.reject_extra(1)?;
        (self.set)(target, &mut args)?;
        Ok(Box::new(()))
    }

    fn value_type(&self) -> TypeDescriptor {
        self.value_type
    }

    fn member(&self) -> &str {
        &self.member
    }
}

impl fmt::Debug for SetterInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetterInvoker")
            .field("owner", &self.owner)
            .field("member", &self.member)
            .field("value_type", &self.value_type)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for GetterInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetterInvoker")
            .field("owner", &self.owner)
            .field("member", &self.member)
            .field("value_type", &self.value_type)
            .finish_non_exhaustive()
    }
}

/// Calls a method.
///
/// A method that fails with an [`InvocationError`], for instance through [`Args::take`]
/// and `?`, reports that error unchanged. Any other failure is wrapped in
/// [`InvocationError::TargetFailed`].
pub struct MethodInvoker {
    owner: TypeDescriptor,
    member: String,
    value_type: TypeDescriptor,
    call: CallFn,
}

impl MethodInvoker {
    /// Creates an invoker for method `member` of `T` returning an `R`.
    pub fn new<T, R>(member: impl Into<String>, call: impl Fn(&mut T, &mut Args) -> Result<R, BoxError> + Send + Sync + 'static) -> Self
    where
        T: Any,
        R: Any + Send,
    {
        let owner = TypeDescriptor::of::<T>();
        let member = member.into();
        let name = member.clone();
        Self {
            owner,
            member,
            value_type: TypeDescriptor::of::<R>(),
            call: Box::new(move |target: &mut dyn Any, args: &mut Args| {
                let target = target.downcast_mut::<T>().ok_or_else(|| mismatched_target(owner))?;
                match call(target, args) {
                    Ok(value) => Ok(Box::new(value) as Value),
                    Err(source) => Err(match source.downcast::<InvocationError>() {
                        Ok(error) => *error,
                        Err(source) => InvocationError::TargetFailed {
                            type_name: owner.name(),
                            member: name.clone(),
                            source,
                        },
                    }),
                }
            }),
        }
    }
}

impl Invoker for MethodInvoker {
    fn invoke(&self, target: &mut dyn Any, args: Vec<Value>) -> Result<Value, InvocationError> {
        let mut args = Args::new(&self.member, args);
        (self.call)(target, &mut args)
    }

    fn value_type(&self) -> TypeDescriptor {
        self.value_type
    }

    fn member(&self) -> &str {
        &self.member
    }
}

impl fmt::Debug for MethodInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvoker")
            .field("owner", &self.owner)
            .field("member", &self.member)
            .field("value_type", &self.value_type)
            .finish_non_exhaustive()
    }
}

/// Stands in for a member that was registered more than once. Every call fails.
#[derive(Debug, Clone)]
pub struct AmbiguousInvoker {
    owner: TypeDescriptor,
    member: String,
    value_type: TypeDescriptor,
}

impl AmbiguousInvoker {
    pub(crate) fn new(owner: TypeDescriptor, member: &str, value_type: TypeDescriptor) -> Self {
        Self {
            owner,
            member: member.to_owned(),
            value_type,
        }
    }
}

impl Invoker for AmbiguousInvoker {
    fn invoke(&self, _target: &mut dyn Any, _args: Vec<Value>) -> Result<Value, InvocationError> {
        Err(InvocationError::Ambiguous {
            type_name: self.owner.name(),
            member: self.member.clone(),
        })
    }

    fn value_type(&self) -> TypeDescriptor {
        self.value_type
    }

    fn member(&self) -> &str {
        &self.member
    }
}

/// Stands in for a member that is registered but not accessible. Every call fails.
#[derive(Debug, Clone)]
pub(crate) struct RestrictedInvoker {
    owner: TypeDescriptor,
    member: String,
    value_type: TypeDescriptor,
}

impl RestrictedInvoker {
    pub(crate) fn new(owner: TypeDescriptor, member: &str, value_type: TypeDescriptor) -> Self {
        Self {
            owner,
            member: member.to_owned(),
            value_type,
        }
    }
}

impl Invoker for RestrictedInvoker {
    fn invoke(&self, _target: &mut dyn Any, _args: Vec<Value>) -> Result<Value, InvocationError> {
        Err(InvocationError::AccessDenied {
            type_name: self.owner.name(),
            member: self.member.clone(),
        })
    }

    fn value_type(&self) -> TypeDescriptor {
        self.value_type
    }

    fn member(&self) -> &str {
        &self.member
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Account {
        balance: i64,
    }

    #[test]
    fn getter_reads_member() {
        let getter = GetterInvoker::new("balance", |a: &Account| a.balance);
        let mut account = Account { balance: 5 };

        let value = getter.invoke(&mut account, Vec::new()).unwrap();
        assert_eq!(*value.downcast::<i64>().unwrap(), 5);
        assert!(getter.value_type().is::<i64>());
        assert_eq!(getter.member(), "balance");
    }

    #[test]
    fn getter_rejects_wrong_target_and_extra_arguments() {
        let getter = GetterInvoker::new("balance", |a: &Account| a.balance);

        let mut wrong = String::new();
        assert!(matches!(
            getter.invoke(&mut wrong, Vec::new()),
            Err(InvocationError::TargetMismatch { .. })
        ));

        let mut account = Account::default();
        assert!(matches!(
            getter.invoke(&mut account, vec![Box::new(1_u8) as Value]),
            Err(InvocationError::ArgumentMismatch { position: 0, .. })
        ));
    }

    #[test]
    fn setter_writes_member() {
        let setter = SetterInvoker::new("balance", |a: &mut Account, v: i64| a.balance = v);
        let mut account = Account::default();

        setter.invoke(&mut account, vec![Box::new(42_i64) as Value]).unwrap();
        assert_eq!(account.balance, 42);
    }

    #[test]
    fn setter_reports_mistyped_argument() {
        let setter = SetterInvoker::new("balance", |a: &mut Account, v: i64| a.balance = v);
        let mut account = Account::default();

        let error = setter.invoke(&mut account, vec![Box::new("42") as Value]).unwrap_err();
        assert!(matches!(error, InvocationError::ArgumentMismatch { position: 0, expected: "i64", .. }));
        assert!(!error.is_retryable());
    }

    #[test]
    fn method_failure_is_wrapped_with_cause() {
        let method = MethodInvoker::new("withdraw", |a: &mut Account, args: &mut Args| {
            let amount: i64 = args.take(0)?;
            if amount > a.balance {
                return Err("insufficient funds".into());
            }
            a.balance -= amount;
            Ok(a.balance)
        });
        let mut account = Account { balance: 10 };

        let left = method.invoke(&mut account, vec![Box::new(4_i64) as Value]).unwrap();
        assert_eq!(*left.downcast::<i64>().unwrap(), 6);

        let error = method.invoke(&mut account, vec![Box::new(100_i64) as Value]).unwrap_err();
        assert!(matches!(error, InvocationError::TargetFailed { ref member, .. } if member == "withdraw"));

        let error = method.invoke(&mut account, Vec::new()).unwrap_err();
        assert!(matches!(error, InvocationError::ArgumentMismatch { .. }));
    }

    #[test]
    fn mistyped_argument_stays_in_place() {
        let mut args = Args::new("m", vec![Box::new(1_u32) as Value]);
        assert!(args.take::<String>(0).is_err());
        assert_eq!(args.take::<u32>(0).unwrap(), 1);
        assert!(args.take::<u32>(0).is_err());
        assert_eq!(args.len(), 1);
        assert!(!args.is_empty());
    }

    #[test]
    fn type_descriptor_compares_by_id() {
        assert_eq!(TypeDescriptor::of::<u8>(), TypeDescriptor::of::<u8>());
        assert_ne!(TypeDescriptor::of::<u8>(), TypeDescriptor::of::<i8>());
        assert_eq!(TypeDescriptor::of::<u8>().to_string(), "u8");
    }
}
