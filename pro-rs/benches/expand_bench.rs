use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pro::error::{EvalResult, Position};
use pro::script::expand::{expand, ExpandContext};
use pro::{Config, Evaluator, OsHost};

/// Variables only; no functions or environment.
struct MapContext(HashMap<String, Vec<String>>);

impl ExpandContext for MapContext {
    fn lookup(&mut self, name: &str) -> Vec<String> {
        self.0.get(name).cloned().unwrap_or_default()
    }

    fn env(&self, _name: &str) -> Option<String> {
        None
    }

    fn call(&mut self, _name: &str, _args: &str) -> EvalResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn position(&self) -> Position {
        Position::memory("bench")
    }
}

fn make_context(values: usize) -> MapContext {
    let list = (0..values).map(|i| format!("src/file{i}.cpp")).collect();
    MapContext(HashMap::from([
        ("SOURCES".to_owned(), list),
        ("TARGET".to_owned(), vec!["demo".to_owned()]),
    ]))
}

fn make_project(modules: usize) -> String {
    let mut src = String::from("TEMPLATE = app\nTARGET = demo\nCONFIG += debug\n");
    src.push_str("defineReplace(prefixed) {\n    out =\n    for(v, $$1): out += $$2$$v\n    return($$out)\n}\n");
    for i in 0..modules {
        src.push_str(&format!("MODULES += mod{i}\n"));
    }
    src.push_str("for(m, MODULES) {\n    SOURCES += src/$${m}.cpp\n    debug: DEFINES += $$upper($$m)_DEBUG\n}\n");
    src.push_str("LIBS = $$prefixed(MODULES, -l)\n");
    src
}

fn bench_expand(c: &mut Criterion) {
    let mut small = make_context(10);
    let mut large = make_context(1000);

    let mut g = c.benchmark_group("expand");

    g.bench_function("plain_text", |b| {
        b.iter(|| expand(black_box("no/references/here.cpp"), &mut small))
    });
    g.bench_function("single_ref", |b| {
        b.iter(|| expand(black_box("lib$${TARGET}.so"), &mut small))
    });
    g.bench_function("list_ref_small", |b| {
        b.iter(|| expand(black_box("-I$$SOURCES"), &mut small))
    });
    g.bench_function("list_ref_large", |b| {
        b.iter(|| expand(black_box("-I$$SOURCES"), &mut large))
    });
    g.bench_function("quoted_large", |b| {
        b.iter(|| expand(black_box("\"$$SOURCES\""), &mut large))
    });

    g.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let small = make_project(10);
    let large = make_project(500);

    let mut g = c.benchmark_group("evaluate");

    g.bench_function("project_small", |b| {
        b.iter(|| {
            let mut ev = Evaluator::with_host(OsHost, Config::new());
            ev.evaluate_str("bench.pro", black_box(&small))
        })
    });
    g.bench_function("project_large", |b| {
        b.iter(|| {
            let mut ev = Evaluator::with_host(OsHost, Config::new());
            ev.evaluate_str("bench.pro", black_box(&large))
        })
    });

    g.finish();
}

criterion_group!(benches, bench_expand, bench_evaluate);
criterion_main!(benches);
