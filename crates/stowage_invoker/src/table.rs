// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    any::{Any, TypeId, type_name},
    collections::{HashMap, HashSet},
    fmt,
    marker::PhantomData,
};

use crate::{
    AmbiguousInvoker, Args, BoxError, GetterInvoker, InvocationError, Invoker, MethodInvoker, SetterInvoker, TypeDescriptor, Value,
    invoker::RestrictedInvoker,
};

/// The kind of member an [`Invoker`] is registered as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Reads a member.
    Getter,
    /// Writes a member.
    Setter,
    /// Calls a method.
    Method,
}

struct TypeEntry {
    owner: TypeDescriptor,
    members: HashMap<MemberKind, HashMap<String, Box<dyn Invoker>>>,
}

impl TypeEntry {
    fn new(owner: TypeDescriptor) -> Self {
        Self {
            owner,
            members: HashMap::new(),
        }
    }

    fn insert(&mut self, kind: MemberKind, member: String, invoker: Box<dyn Invoker>) {
        let members = self.members.entry(kind).or_default();
        let invoker = match members.get(&member) {
            Some(existing) => {
                tracing::warn!(
                    invoker.owner = self.owner.name(),
                    invoker.member = %member,
                    invoker.kind = ?kind,
                    "member registered more than once, calls will fail as ambiguous"
                );
                Box::new(AmbiguousInvoker::new(self.owner, &member, existing.value_type()))
            }
            None => invoker,
        };
        members.insert(member, invoker);
    }

    fn find(&self, kind: MemberKind, member: &str) -> Option<&dyn Invoker> {
        self.members.get(&kind)?.get(member).map(AsRef::as_ref)
    }
}

/// Invokers for every registered member, keyed by owner type, member kind and name.
///
/// Tables are built once at setup time, one type at a time through
/// [`builder`](Self::builder), and combined with [`merge`](Self::merge). Registering the
/// same member of the same kind twice does not pick one of them: the member becomes an
/// [`AmbiguousInvoker`] and every call to it fails.
#[derive(Default)]
pub struct InvokerTable {
    types: HashMap<TypeId, TypeEntry>,
}

impl fmt::Debug for InvokerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in self.types.values() {
            let mut members: Vec<String> = entry
                .members
                .iter()
                .flat_map(|(kind, names)| names.keys().map(move |name| format!("{kind:?}:{name}")))
                .collect();
            members.sort();
            map.entry(&entry.owner.name(), &members);
        }
        map.finish()
    }
}

impl InvokerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts registering the members of `T`.
    #[must_use]
    pub fn builder<T: Any>() -> TypeInvokers<T> {
        TypeInvokers {
            registrations: Vec::new(),
            denied: HashSet::new(),
            _owner: PhantomData,
        }
    }

    /// Moves every invoker of `other` into this table.
    ///
    /// Members present in both tables become ambiguous.
    pub fn merge(&mut self, other: Self) {
        for (type_id, entry) in other.types {
            let target = self.types.entry(type_id).or_insert_with(|| TypeEntry::new(entry.owner));
            for (kind, members) in entry.members {
                for (member, invoker) in members {
                    target.insert(kind, member, invoker);
                }
            }
        }
    }

    /// Returns the invoker registered as `kind` under `member` for the type `type_id`.
    #[must_use]
    pub fn find(&self, type_id: TypeId, kind: MemberKind, member: &str) -> Option<&dyn Invoker> {
        self.types.get(&type_id)?.find(kind, member)
    }

    /// Returns the getter `member` of the type `type_id`.
    #[must_use]
    pub fn getter(&self, type_id: TypeId, member: &str) -> Option<&dyn Invoker> {
        self.find(type_id, MemberKind::Getter, member)
    }

    /// Returns the setter `member` of the type `type_id`.
    #[must_use]
    pub fn setter(&self, type_id: TypeId, member: &str) -> Option<&dyn Invoker> {
        self.find(type_id, MemberKind::Setter, member)
    }

    /// Returns the method `member` of the type `type_id`.
    #[must_use]
    pub fn method(&self, type_id: TypeId, member: &str) -> Option<&dyn Invoker> {
        self.find(type_id, MemberKind::Method, member)
    }

    /// Returns `true` if the type `type_id` has a getter named `member`.
    #[must_use]
    pub fn has_getter(&self, type_id: TypeId, member: &str) -> bool {
        self.getter(type_id, member).is_some()
    }

    /// Returns `true` if the type `type_id` has a setter named `member`.
    #[must_use]
    pub fn has_setter(&self, type_id: TypeId, member: &str) -> bool {
        self.setter(type_id, member).is_some()
    }

    /// Returns the names of every getter of the type `type_id`, sorted.
    #[must_use]
    pub fn getter_names(&self, type_id: TypeId) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .types
            .get(&type_id)
            .and_then(|entry| entry.members.get(&MemberKind::Getter))
            .map(|members| members.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Reads member `member` of `target` as an `R`.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::NoSuchMember`] if `T` has no such getter,
    /// [`InvocationError::ReturnMismatch`] if it does not return an `R`, and whatever the
    /// getter itself reports otherwise.
    pub fn get_value<T: Any, R: Any>(&self, target: &mut T, member: &str) -> Result<R, InvocationError> {
        let invoker = self.require::<T>(MemberKind::Getter, member)?;
        downcast_return(invoker, invoker.invoke(target, Vec::new())?)
    }

    /// Writes `value` to member `member` of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::NoSuchMember`] if `T` has no such setter, and whatever
    /// the setter itself reports otherwise.
    pub fn set_value<T: Any, A: Any + Send>(&self, target: &mut T, member: &str, value: A) -> Result<(), InvocationError> {
        let invoker = self.require::<T>(MemberKind::Setter, member)?;
        invoker.invoke(target, vec![Box::new(value) as Value])?;
        Ok(())
    }

    /// Calls method `member` of `target` with `args`, expecting an `R` back.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::NoSuchMember`] if `T` has no such method,
    /// [`InvocationError::ReturnMismatch`] if it does not return an `R`, and whatever the
    /// method itself reports otherwise.
    pub fn call<T: Any, R: Any>(&self, target: &mut T, member: &str, args: Vec<Value>) -> Result<R, InvocationError> {
        let invoker = self.require::<T>(MemberKind::Method, member)?;
        downcast_return(invoker, invoker.invoke(target, args)?)
    }

    fn require<T: Any>(&self, kind: MemberKind, member: &str) -> Result<&dyn Invoker, InvocationError> {
        self.find(TypeId::of::<T>(), kind, member)
            .ok_or_else(|| InvocationError::NoSuchMember {
                type_name: type_name::<T>(),
                member: member.to_owned(),
            })
    }
}

fn downcast_return<R: Any>(invoker: &dyn Invoker, value: Value) -> Result<R, InvocationError> {
    match value.downcast::<R>() {
        Ok(value) => Ok(*value),
        Err(_) => Err(InvocationError::ReturnMismatch {
            member: invoker.member().to_owned(),
            actual: invoker.value_type().name(),
            requested: type_name::<R>(),
        }),
    }
}

/// Registers the members of one type. Created by [`InvokerTable::builder`].
pub struct TypeInvokers<T> {
    registrations: Vec<(MemberKind, String, Box<dyn Invoker>)>,
    denied: HashSet<String>,
    _owner: PhantomData<fn(T)>,
}

impl<T> fmt::Debug for TypeInvokers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInvokers")
            .field("owner", &type_name::<T>())
            .field("registrations", &self.registrations.len())
            .field("denied", &self.denied)
            .finish()
    }
}

impl<T: Any> TypeInvokers<T> {
    /// Registers a getter.
    #[must_use]
    pub fn getter<R>(mut self, member: &str, get: impl Fn(&T) -> R + Send + Sync + 'static) -> Self
    where
        R: Any + Send,
    {
        self.registrations
            .push((MemberKind::Getter, member.to_owned(), Box::new(GetterInvoker::new(member, get))));
        self
    }

    /// Registers a setter.
    #[must_use]
    pub fn setter<A>(mut self, member: &str, set: impl Fn(&mut T, A) + Send + Sync + 'static) -> Self
    where
        A: Any,
    {
        self.registrations
            .push((MemberKind::Setter, member.to_owned(), Box::new(SetterInvoker::new(member, set))));
        self
    }

    /// Registers a method.
    #[must_use]
    pub fn method<R>(mut self, member: &str, call: impl Fn(&mut T, &mut Args) -> Result<R, BoxError> + Send + Sync + 'static) -> Self
    where
        R: Any + Send,
    {
        self.registrations
            .push((MemberKind::Method, member.to_owned(), Box::new(MethodInvoker::new(member, call))));
        self
    }

    /// Marks every member named `member` as not accessible. Calls to it fail with
    /// [`InvocationError::AccessDenied`].
    #[must_use]
    pub fn deny(mut self, member: &str) -> Self {
        self.denied.insert(member.to_owned());
        self
    }

    /// Finishes the registration.
    #[must_use]
    pub fn build(self) -> InvokerTable {
        let owner = TypeDescriptor::of::<T>();
        let mut entry = TypeEntry::new(owner);
        for (kind, member, invoker) in self.registrations {
            let invoker: Box<dyn Invoker> = if self.denied.contains(&member) {
                Box::new(RestrictedInvoker::new(owner, &member, invoker.value_type()))
            } else {
                invoker
            };
            entry.insert(kind, member, invoker);
        }

        let mut table = InvokerTable::new();
        table.types.insert(owner.id(), entry);
        table
    }
}

#[cfg(test)]
mod tests {
    use testing_aids::LogCapture;

    use super::*;

    #[derive(Debug, Default)]
    struct Order {
        id: u64,
        lines: Vec<String>,
        secret: String,
    }

    fn orders() -> InvokerTable {
        InvokerTable::builder::<Order>()
            .getter("id", |o: &Order| o.id)
            .setter("id", |o: &mut Order, id: u64| o.id = id)
            .getter("lines", |o: &Order| o.lines.len())
            .getter("secret", |o: &Order| o.secret.clone())
            .method("add_line", |o: &mut Order, args: &mut Args| {
                o.lines.push(args.take::<String>(0)?);
                Ok(o.lines.len())
            })
            .deny("secret")
            .build()
    }

    #[test]
    fn typed_access_round_trips_through_table() {
        let table = orders();
        let mut order = Order::default();

        table.set_value(&mut order, "id", 9_u64).unwrap();
        let count: usize = table.call(&mut order, "add_line", vec![Box::new("widget".to_string()) as Value]).unwrap();

        assert_eq!(table.get_value::<Order, u64>(&mut order, "id").unwrap(), 9);
        assert_eq!(count, 1);
    }

    #[test]
    fn lookups_are_keyed_by_type_kind_and_name() {
        let table = orders();
        let order = TypeId::of::<Order>();

        assert!(table.has_getter(order, "id"));
        assert!(table.has_setter(order, "id"));
        assert!(!table.has_setter(order, "lines"));
        assert!(table.method(order, "add_line").is_some());
        assert!(table.getter(TypeId::of::<String>(), "id").is_none());
        assert_eq!(table.getter_names(order), vec!["id", "lines", "secret"]);
        assert!(table.getter(order, "id").unwrap().value_type().is::<u64>());
    }

    #[test]
    fn denied_member_fails_with_access_denied() {
        let table = orders();
        let mut order = Order::default();

        let error = table.get_value::<Order, String>(&mut order, "secret").unwrap_err();
        assert!(matches!(error, InvocationError::AccessDenied { ref member, .. } if member == "secret"));
        assert!(table.getter(TypeId::of::<Order>(), "secret").unwrap().value_type().is::<String>());
    }

    #[test]
    fn duplicate_registration_becomes_ambiguous() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let table = InvokerTable::builder::<Order>()
            .method("total", |_o: &mut Order, _args: &mut Args| Ok(1_u32))
            .method("total", |_o: &mut Order, _args: &mut Args| Ok(2_u32))
            .build();

        let error = table.call::<Order, u32>(&mut Order::default(), "total", Vec::new()).unwrap_err();
        assert!(matches!(error, InvocationError::Ambiguous { .. }));
        capture.assert_contains("registered more than once");
    }

    #[test]
    fn merging_tables_keeps_both_types() {
        let mut table = orders();
        table.merge(InvokerTable::builder::<String>().getter("len", String::len).build());

        let mut text = "abc".to_string();
        assert_eq!(table.get_value::<String, usize>(&mut text, "len").unwrap(), 3);
        assert!(table.has_getter(TypeId::of::<Order>(), "id"));

        let rendered = format!("{table:?}");
        assert!(rendered.contains("Getter:len"), "{rendered}");
    }

    #[test]
    fn missing_member_and_wrong_return_type_are_reported() {
        let table = orders();
        let mut order = Order::default();

        assert!(matches!(
            table.get_value::<Order, u64>(&mut order, "nope"),
            Err(InvocationError::NoSuchMember { .. })
        ));
        assert!(matches!(
            table.get_value::<Order, String>(&mut order, "id"),
            Err(InvocationError::ReturnMismatch { actual: "u64", .. })
        ));
    }
}
