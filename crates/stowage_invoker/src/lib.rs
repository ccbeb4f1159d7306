// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Type-keyed dispatch tables for reading, writing and calling members of values.
//!
//! Result mapping needs to read and write named members of values whose concrete type is
//! only known at runtime. Instead of looking members up by reflection on every call, the
//! accessors are registered once, at setup time, into an [`InvokerTable`] keyed by the
//! value's [`TypeId`](std::any::TypeId) and the member name. Each entry is an [`Invoker`].
//!
//! # Examples
//!
//! ```
//! use stowage_invoker::InvokerTable;
//!
//! #[derive(Default)]
//! struct User {
//!     name: String,
//!     visits: u32,
//! }
//!
//! let table = InvokerTable::builder::<User>()
//!     .getter("name", |u: &User| u.name.clone())
//!     .setter("name", |u: &mut User, name: String| u.name = name)
//!     .method("visit", |u: &mut User, _args| {
//!         u.visits += 1;
//!         Ok(u.visits)
//!     })
//!     .build();
//!
//! let mut user = User::default();
//! table.set_value(&mut user, "name", "alice".to_string())?;
//! let visits: u32 = table.call(&mut user, "visit", Vec::new())?;
//!
//! assert_eq!(table.get_value::<User, String>(&mut user, "name")?, "alice");
//! assert_eq!(visits, 1);
//! # Ok::<(), stowage_invoker::InvocationError>(())
//! ```

mod error;
mod invoker;
mod table;

#[doc(inline)]
pub use error::{BoxError, InvocationError};
#[doc(inline)]
pub use invoker::{AmbiguousInvoker, Args, GetterInvoker, Invoker, MethodInvoker, SetterInvoker, TypeDescriptor, Value};
#[doc(inline)]
pub use table::{InvokerTable, MemberKind, TypeInvokers};
