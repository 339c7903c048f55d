use criterion::{Criterion, criterion_group, criterion_main};
use stemma::rpn::{self, NoFields, RpnCtx};

fn bench_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("rpn");

    let arithmetic = rpn::compile("#2 #3 A #4 D #5 E").expect("compile arithmetic");
    let mut ctx = RpnCtx::new(2);
    group.bench_function("arithmetic", |b| {
        b.iter(|| ctx.integer(&NoFields, &arithmetic).expect("evaluate"))
    });

    let predicate = rpn::compile("@1 #100 H @1 #10 K M").expect("compile predicate");
    let mut ctx = RpnCtx::new(2);
    ctx.set_reg(1, b"42").expect("set register");
    group.bench_function("range_predicate", |b| {
        b.iter(|| ctx.bool(&NoFields, &predicate).expect("evaluate"))
    });

    group.bench_function("compile", |b| {
        b.iter(|| rpn::compile("@1 #100 H @1 #10 K M \"ab \"ab c M").expect("compile"))
    });

    group.finish();
}

fn bench_eval_registers(c: &mut Criterion) {
    let expr = rpn::compile("$1 $2 c").expect("compile");
    let mut ctx = RpnCtx::new(3);
    ctx.set_reg(1, b"ABnode0001").expect("set register");
    ctx.set_reg(2, b"ABnode0001").expect("set register");

    c.bench_function("string_register_compare", |b| {
        b.iter(|| ctx.bool(&NoFields, &expr).expect("evaluate"))
    });
}

criterion_group!(benches, bench_eval, bench_eval_registers);
criterion_main!(benches);
