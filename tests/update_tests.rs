//! UPDATE queries: in-place field assignment, NU accounting, join limits.


use rbql::{safe_set, CompiledQuery, ErrorKind, JoinOperation, Value};
use test_data_gen::{int_table, run_join_query, run_query};

#[test]
fn update_modifies_matching_rows_and_passes_the_rest_through() {
    let input = vec![
        vec![Value::Int(1), Value::from("a")],
        vec![Value::Int(2), Value::from("b")],
        vec![Value::Int(1), Value::from("c")],
    ];
    let query = CompiledQuery::update(|_ctx, up_fields| safe_set(up_fields, 2, Value::from("z")))
        .with_where(|ctx| Ok(ctx.a(1)? == Value::Int(1)));
    let (out, summary) = run_query(query, input).unwrap();
    assert_eq!(
        out,
        vec![
            vec![Value::Int(1), Value::from("z")],
            vec![Value::Int(2), Value::from("b")],
            vec![Value::Int(1), Value::from("z")],
        ]
    );
    assert_eq!(summary.records_updated, 2);
    assert_eq!(summary.records_read, 3);
}

#[test]
fn update_assignment_out_of_range_is_a_bad_field_error() {
    let input = int_table(&[&[1]]);
    let query = CompiledQuery::update(|_ctx, up_fields| safe_set(up_fields, 4, Value::Null));
    let err = run_query(query, input).unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueryExecution);
    assert_eq!(err.message, "No 'a4' column at record: 1");
}

#[test]
fn update_with_inner_join_touches_only_matched_rows() {
    let input = int_table(&[&[1, 0], &[2, 0]]);
    let join_table = vec![vec![Value::Int(1), Value::Int(99)]];
    let query = CompiledQuery::update(|ctx, up_fields| {
        let b2 = ctx.b(2)?;
        safe_set(up_fields, 2, b2)
    })
    .with_join(JoinOperation::Inner, |ctx| ctx.a(1));
    let (out, summary) = run_join_query(query, input, join_table, 1).unwrap();
    assert_eq!(out, int_table(&[&[1, 99], &[2, 0]]));
    assert_eq!(summary.records_updated, 1);
}

#[test]
fn update_rejects_multiple_join_matches() {
    let input = int_table(&[&[1, 0]]);
    let join_table = int_table(&[&[1, 5], &[1, 6]]);
    let query = CompiledQuery::update(|ctx, up_fields| {
        let b2 = ctx.b(2)?;
        safe_set(up_fields, 2, b2)
    })
    .with_join(JoinOperation::Inner, |ctx| ctx.a(1));
    let err = run_join_query(query, input, join_table, 1).unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueryExecution);
    assert_eq!(
        err.message,
        "More than one record in UPDATE query matched A-key in join table B"
    );
}

#[test]
fn unmatched_rows_are_emitted_byte_identical() {
    let input = vec![vec![
        Value::from("keep"),
        Value::Float(1.25),
        Value::Null,
    ]];
    let query = CompiledQuery::update(|_ctx, up_fields| safe_set(up_fields, 1, Value::from("no")))
        .with_where(|_ctx| Ok(false));
    let (out, summary) = run_query(query, input.clone()).unwrap();
    assert_eq!(out, input);
    assert_eq!(summary.records_updated, 0);
}

#[test]
fn update_cannot_use_distinct_or_order_by() {
    let query = CompiledQuery::update(|_ctx, _up| Ok(())).with_distinct();
    let err = run_query(query, int_table(&[&[1]])).unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueryParsing);
    assert!(err.message.contains("not allowed in \"UPDATE\""));
}
