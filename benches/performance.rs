use criterion::{criterion_group, criterion_main, Criterion};
use rbql::{CompiledQuery, QueryRunner, TableIterator, TableWriter, Value};

fn make_table(rows: usize) -> Vec<Vec<Value>> {
    (0..rows)
        .map(|i| {
            vec![
                Value::Str(format!("group-{}", i % 8)),
                Value::Int(i as i64),
                Value::Float((i % 100) as f64 / 3.0),
            ]
        })
        .collect()
}

fn bench_select_where(c: &mut Criterion) {
    let table = make_table(4096);
    c.bench_function("select_where", |b| {
        b.iter(|| {
            let query = CompiledQuery::select(|ctx| {
                Ok(vec![ctx.a(1)?.into(), ctx.a(2)?.into()])
            })
            .with_where(|ctx| Ok(ctx.a(2)? != Value::Int(-1)));
            let mut runner = QueryRunner::new(query);
            let mut input = TableIterator::new(table.clone());
            let mut output = TableWriter::new();
            runner.run(&mut input, None, &mut output).unwrap();
            output.records.len()
        })
    });
}

fn bench_group_aggregate(c: &mut Criterion) {
    let table = make_table(4096);
    c.bench_function("group_sum_avg", |b| {
        b.iter(|| {
            let query = CompiledQuery::select(|ctx| {
                let key = ctx.a(1)?;
                let total = ctx.sum(ctx.a(2)?);
                let mean = ctx.avg(ctx.a(3)?);
                Ok(vec![key.into(), total, mean])
            })
            .with_group_by(|ctx| ctx.a(1));
            let mut runner = QueryRunner::new(query);
            let mut input = TableIterator::new(table.clone());
            let mut output = TableWriter::new();
            runner.run(&mut input, None, &mut output).unwrap();
            output.records.len()
        })
    });
}

fn bench_order_by(c: &mut Criterion) {
    let table = make_table(4096);
    c.bench_function("order_by_desc", |b| {
        b.iter(|| {
            let query = CompiledQuery::select(|ctx| Ok(vec![ctx.a(2)?.into()]))
                .with_order_by(|ctx| Ok(vec![ctx.a(3)?]), true);
            let mut runner = QueryRunner::new(query);
            let mut input = TableIterator::new(table.clone());
            let mut output = TableWriter::new();
            runner.run(&mut input, None, &mut output).unwrap();
            output.records.len()
        })
    });
}

criterion_group!(
    benches,
    bench_select_where,
    bench_group_aggregate,
    bench_order_by
);
criterion_main!(benches);
