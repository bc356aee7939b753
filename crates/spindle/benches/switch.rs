use criterion::{black_box, criterion_group, criterion_main, Criterion};
use spindle::{Callable, Coroutine, Transfer, Value};

fn bench_managed_round_trip(c: &mut Criterion) {
    let echo = Coroutine::new(Callable::new("echo", |_| loop {
        Coroutine::yield_(Value::Int(1))?;
    }))
    .unwrap();
    echo.resume(vec![]).unwrap();

    c.bench_function("managed_resume_yield", |b| {
        b.iter(|| echo.resume_value(black_box(Value::Int(2))).unwrap());
    });

    echo.kill(None, None).unwrap();
}

fn bench_raw_round_trip(c: &mut Criterion) {
    let raw = Coroutine::raw(
        |_| loop {
            if Coroutine::yield_raw(Transfer::Raw(1)).is_err() {
                return Transfer::None;
            }
        },
        0,
    )
    .unwrap();
    raw.resume_raw(Transfer::None).unwrap();

    c.bench_function("raw_resume_yield", |b| {
        b.iter(|| raw.resume_raw(black_box(Transfer::Raw(2))).unwrap());
    });

    raw.kill(None, None).unwrap();
}

fn bench_create_and_finish(c: &mut Criterion) {
    let noop = Callable::new("noop", |_| Ok(Value::Null));
    c.bench_function("create_run_finish", |b| {
        b.iter(|| {
            let co = Coroutine::new(noop.clone()).unwrap();
            co.resume(vec![]).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_managed_round_trip,
    bench_raw_round_trip,
    bench_create_and_finish
);
criterion_main!(benches);
