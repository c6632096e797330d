//! Benchmarks for the folding pipeline.
//!
//! Measures the stages a build pays for on every run:
//! - Parsing and writing a class file
//! - Building a configuration (parse, marker scan, platform defaults)
//! - A complete run folding many `Integer.parseInt` initializers

extern crate classfold;

use std::{hint::black_box, sync::Arc};

use classfold::prelude::*;
use criterion::{criterion_group, criterion_main, Criterion};

const STATIC_FINAL: AccessFlags = AccessFlags::PUBLIC
    .union(AccessFlags::STATIC)
    .union(AccessFlags::FINAL);

/// A class with `fields` initializers of the form `static final int Fn = Integer.parseInt("n")`.
fn holder(fields: usize) -> Vec<u8> {
    let mut builder = ClassBuilder::new("bench/Holder");
    for index in 0..fields {
        builder = builder.field(STATIC_FINAL, &format!("F{index}"), "I");
    }
    builder
        .method(AccessFlags::STATIC, "<clinit>", "()V", |mut m| {
            for index in 0..fields {
                m = m
                    .string(&index.to_string())
                    .invokestatic("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
                    .putstatic("bench/Holder", &format!("F{index}"), "I");
            }
            m.op(Opcode::Return)
        })
        .build()
        .unwrap()
        .to_bytes()
        .unwrap()
}

fn bench_parse_full(c: &mut Criterion) {
    let bytes = holder(200);

    c.bench_function("classfile_parse_full", |b| {
        b.iter(|| {
            let class = ClassFile::parse(black_box(&bytes), ParseMode::Full).unwrap();
            black_box(class)
        });
    });
}

fn bench_parse_structure(c: &mut Criterion) {
    let bytes = holder(200);

    c.bench_function("classfile_parse_structure", |b| {
        b.iter(|| {
            let class = ClassFile::parse(black_box(&bytes), ParseMode::Structure).unwrap();
            black_box(class)
        });
    });
}

fn bench_write_modified(c: &mut Criterion) {
    let mut class = ClassFile::parse(&holder(200), ParseMode::Full).unwrap();
    for method in &mut class.methods {
        if let Some(code) = method.code.as_mut() {
            code.modified = true;
        }
    }

    c.bench_function("classfile_write_modified", |b| {
        b.iter(|| black_box(class.to_bytes().unwrap()));
    });
}

fn bench_configuration(c: &mut Criterion) {
    let bytes = holder(50);

    c.bench_function("configuration_build", |b| {
        b.iter(|| {
            let config = RunConfiguration::builder()
                .input(BytesInput::for_class("bench/Holder", bytes.clone()))
                .platform_defaults()
                .output_sink(Arc::new(CollectingSink::new()))
                .build()
                .unwrap();
            black_box(config)
        });
    });
}

fn bench_fold_initializers(c: &mut Criterion) {
    let bytes = holder(50);

    c.bench_function("fold_parse_int_initializers", |b| {
        b.iter(|| {
            let sink = Arc::new(CollectingSink::new());
            let config = RunConfiguration::builder()
                .input(BytesInput::for_class("bench/Holder", bytes.clone()))
                .platform_defaults()
                .output_sink(sink.clone())
                .build()
                .unwrap();
            let result = Optimizer::new(config).run().unwrap();
            black_box((result, sink))
        });
    });
}

criterion_group!(
    benches,
    bench_parse_full,
    bench_parse_structure,
    bench_write_modified,
    bench_configuration,
    bench_fold_initializers,
);
criterion_main!(benches);
