//! Read/write round-trip benchmark over a synthetic module with many
//! functions.

use criterion::{criterion_group, criterion_main, Criterion};
use wasmith::binary;
use wasmith::features::Features;

fn synthetic_module() -> Vec<u8> {
    let mut source = String::from("(module (memory 1)\n");
    for i in 0..200 {
        source.push_str(&format!(
            "(func (export \"f{i}\") (result i32)
                (i32.add (i32.const {i}) (i32.load (i32.const 0))))\n"
        ));
    }
    source.push(')');
    let module = wasmith::text::to_binary(&source).expect("compile failed");
    binary::write(&module)
}

fn bench_roundtrip(c: &mut Criterion) {
    let bytes = synthetic_module();
    let features = Features::mvp();

    c.bench_function("read", |b| {
        b.iter(|| binary::read(&bytes, &features).unwrap())
    });

    let module = binary::read(&bytes, &features).unwrap();
    c.bench_function("write", |b| b.iter(|| binary::write(&module)));

    c.bench_function("read_write", |b| {
        b.iter(|| binary::write(&binary::read(&bytes, &features).unwrap()))
    });
}

criterion_group!(benches, bench_roundtrip);
criterion_main!(benches);
