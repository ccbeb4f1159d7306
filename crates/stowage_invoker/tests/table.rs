// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Populating values from rows through a shared invoker table.

use std::{any::TypeId, sync::Arc, thread};

use stowage_invoker::{InvocationError, InvokerTable, Value};

#[derive(Debug, Default, PartialEq)]
struct Customer {
    id: i64,
    name: String,
    email: Option<String>,
}

fn customers() -> InvokerTable {
    InvokerTable::builder::<Customer>()
        .getter("id", |c: &Customer| c.id)
        .setter("id", |c: &mut Customer, id: i64| c.id = id)
        .getter("name", |c: &Customer| c.name.clone())
        .setter("name", |c: &mut Customer, name: String| c.name = name)
        .setter("email", |c: &mut Customer, email: Option<String>| c.email = email)
        .build()
}

fn map_row(table: &InvokerTable, row: Vec<(&str, Value)>) -> Result<Customer, InvocationError> {
    let mut customer = Customer::default();
    for (column, value) in row {
        let setter = table
            .setter(TypeId::of::<Customer>(), column)
            .ok_or_else(|| InvocationError::NoSuchMember {
                type_name: "Customer",
                member: column.to_owned(),
            })?;
        setter.invoke(&mut customer, vec![value])?;
    }
    Ok(customer)
}

#[test]
fn rows_are_mapped_through_setters() {
    let table = customers();

    let customer = map_row(
        &table,
        vec![
            ("id", Box::new(7_i64) as Value),
            ("name", Box::new("Ada".to_string()) as Value),
            ("email", Box::new(None::<String>) as Value),
        ],
    )
    .unwrap();

    assert_eq!(
        customer,
        Customer {
            id: 7,
            name: "Ada".to_string(),
            email: None,
        }
    );
}

#[test]
fn mistyped_column_is_not_retryable() {
    let table = customers();

    let error = map_row(&table, vec![("id", Box::new("seven") as Value)]).unwrap_err();

    assert!(matches!(error, InvocationError::ArgumentMismatch { .. }));
    assert!(!error.is_retryable());
    assert_eq!(error.member(), Some("id"));
}

#[test]
fn table_is_shared_between_threads() {
    let table = Arc::new(customers());

    let names: Vec<String> = (0..4)
        .map(|i| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                let mut customer = Customer::default();
                table.set_value(&mut customer, "name", format!("c{i}")).unwrap();
                table.get_value::<Customer, String>(&mut customer, "name").unwrap()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(names, vec!["c0", "c1", "c2", "c3"]);
}
