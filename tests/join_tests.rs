//! Joiner variants: inner skip, left null-fill, strict-left errors.


use rbql::{CompiledQuery, ErrorKind, JoinOperation, Value};
use test_data_gen::{int_table, run_join_query};

fn select_a1_b2() -> CompiledQuery {
    CompiledQuery::select(|ctx| Ok(vec![ctx.a(1)?.into(), ctx.b(2)?.into()]))
        .with_join(JoinOperation::Left, |ctx| ctx.a(1))
}

#[test]
fn left_join_null_fills_unmatched_rows() {
    let input = int_table(&[&[1], &[2]]);
    let join_table = vec![vec![Value::Int(1), Value::from("R1")]];
    let (out, _) = run_join_query(select_a1_b2(), input, join_table, 1).unwrap();
    assert_eq!(
        out,
        vec![
            vec![Value::Int(1), Value::from("R1")],
            vec![Value::Int(2), Value::Null],
        ]
    );
}

#[test]
fn left_join_null_fill_spans_max_record_len() {
    let input = int_table(&[&[7]]);
    let join_table = vec![
        vec![Value::Int(1), Value::from("x"), Value::from("y")],
        vec![Value::Int(2)],
    ];
    let query = CompiledQuery::select(|ctx| {
        Ok(vec![
            ctx.b(1)?.into(),
            ctx.b(2)?.into(),
            ctx.b(3)?.into(),
        ])
    })
    .with_join(JoinOperation::Left, |ctx| ctx.a(1));
    let (out, _) = run_join_query(query, input, join_table, 1).unwrap();
    assert_eq!(out, vec![vec![Value::Null, Value::Null, Value::Null]]);
}

#[test]
fn inner_join_skips_unmatched_rows_and_multiplies_matches() {
    let input = int_table(&[&[1], &[2], &[3]]);
    let join_table = vec![
        vec![Value::Int(1), Value::from("m1")],
        vec![Value::Int(1), Value::from("m2")],
        vec![Value::Int(3), Value::from("m3")],
    ];
    let query = CompiledQuery::select(|ctx| Ok(vec![ctx.a(1)?.into(), ctx.b(2)?.into()]))
        .with_join(JoinOperation::Inner, |ctx| ctx.a(1));
    let (out, _) = run_join_query(query, input, join_table, 1).unwrap();
    assert_eq!(
        out,
        vec![
            vec![Value::Int(1), Value::from("m1")],
            vec![Value::Int(1), Value::from("m2")],
            vec![Value::Int(3), Value::from("m3")],
        ]
    );
}

#[test]
fn strict_left_join_rejects_missing_match() {
    let input = int_table(&[&[1], &[3]]);
    let join_table = vec![vec![Value::Int(1), Value::from("R1")]];
    let query = CompiledQuery::select(|ctx| Ok(vec![ctx.b(2)?.into()]))
        .with_join(JoinOperation::StrictLeft, |ctx| ctx.a(1));
    let err = run_join_query(query, input, join_table, 1).unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueryExecution);
    assert!(err
        .message
        .contains("In 'STRICT LEFT JOIN' each key in A must have exactly one match in B"));
    assert!(err.message.contains("Bad A key: '3'"));
}

#[test]
fn strict_left_join_rejects_double_match() {
    let input = int_table(&[&[1]]);
    let join_table = vec![
        vec![Value::Int(1), Value::from("m1")],
        vec![Value::Int(1), Value::from("m2")],
    ];
    let query = CompiledQuery::select(|ctx| Ok(vec![ctx.b(2)?.into()]))
        .with_join(JoinOperation::StrictLeft, |ctx| ctx.a(1));
    let err = run_join_query(query, input, join_table, 1).unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueryExecution);
    assert!(err.message.contains("Bad A key: '1'"));
}

#[test]
fn join_keys_do_not_conflate_types() {
    // Int 1 on the left must not match the string "1" in the join table.
    let input = int_table(&[&[1]]);
    let join_table = vec![vec![Value::from("1"), Value::from("str-match")]];
    let query = CompiledQuery::select(|ctx| Ok(vec![ctx.a(1)?.into(), ctx.b(2)?.into()]))
        .with_join(JoinOperation::Left, |ctx| ctx.a(1));
    let (out, _) = run_join_query(query, input, join_table, 1).unwrap();
    assert_eq!(out, vec![vec![Value::Int(1), Value::Null]]);
}

#[test]
fn join_warnings_are_merged_into_the_summary() {
    let input = int_table(&[&[1]]);
    let join_table = vec![
        vec![Value::Int(1), Value::from("a")],
        vec![Value::Int(2)],
    ];
    let query = CompiledQuery::select(|ctx| Ok(vec![ctx.a(1)?.into()]))
        .with_join(JoinOperation::Left, |ctx| ctx.a(1));
    let (_, summary) = run_join_query(query, input, join_table, 1).unwrap();
    assert_eq!(summary.warnings.len(), 1);
    assert!(summary.warnings[0].contains("\"join\" table"));
}

#[test]
fn join_query_without_join_table_is_rejected() {
    let query = CompiledQuery::select(|ctx| Ok(vec![ctx.a(1)?.into()]))
        .with_join(JoinOperation::Inner, |ctx| ctx.a(1));
    let err = test_data_gen::run_query(query, int_table(&[&[1]])).unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueryParsing);
    assert!(err.message.contains("no join table"));
}
