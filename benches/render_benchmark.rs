//! Render Benchmark
//! Measures list-heavy renders: plain listing, built-in pipelines and macro calls

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use octofhir_template::ast::{
    Block, BuiltInExpr, Call, CallSiteArgs, Comparison, Element, Expression, Interpolation,
    Lambda, List, Literal, MacroCall, MacroDef, MacroDefinition, MacroParam, Text, Variable,
};
use octofhir_template::eval::CmpOp;
use octofhir_template::{Configuration, Template, Value};
use std::hint::black_box;
use std::sync::Arc;

/// Sequence sizes to render
const SIZES: &[usize] = &[10, 100, 1000];

fn var(name: &str) -> Arc<dyn Expression> {
    Arc::new(Variable::new(name))
}

fn lit(value: impl Into<Value>) -> Arc<dyn Expression> {
    Arc::new(Literal::new(value))
}

fn items(size: usize) -> Value {
    let items = (0..size).map(|n| Value::from(n as i64)).collect();
    let mut data = indexmap::IndexMap::new();
    data.insert("items".to_string(), Value::sequence(items));
    Value::hash(data)
}

fn create_template(root: Arc<dyn Element>) -> Arc<Template> {
    let mut configuration = Configuration::default();
    configuration
        .set_setting("number_format", "0.##")
        .expect("valid number format");
    Arc::new(configuration).create_template("bench.ftl", root)
}

/// `<#list items as n>${n};</#list>`
fn plain_listing() -> Arc<Template> {
    let body: Arc<dyn Element> = Arc::new(Block::new(vec![
        Arc::new(Interpolation::new(var("n"))),
        Arc::new(Text::new(";")),
    ]));
    create_template(Arc::new(List::new(var("items"), "n", body)))
}

/// `${items?filter(n -> n > 3)?map(n -> n?string("0.0"))?join(", ")}`
fn builtin_pipeline() -> Arc<Template> {
    let above: Arc<dyn Expression> = Arc::new(Lambda::new(
        "n",
        Arc::new(Comparison::new(var("n"), CmpOp::Gt, lit(3))),
    ));
    let filtered: Arc<dyn Expression> = Arc::new(Call::new(
        Arc::new(BuiltInExpr::new(var("items"), "filter").with_lazy_result()),
        vec![above],
    ));
    let as_text: Arc<dyn Expression> = Arc::new(Lambda::new(
        "n",
        Arc::new(Call::new(
            Arc::new(BuiltInExpr::new(var("n"), "string")),
            vec![lit("0.0")],
        )),
    ));
    let mapped: Arc<dyn Expression> = Arc::new(Call::new(
        Arc::new(BuiltInExpr::new(filtered, "map")),
        vec![as_text],
    ));
    let joined: Arc<dyn Expression> = Arc::new(Call::new(
        Arc::new(BuiltInExpr::new(mapped, "join")),
        vec![lit(", ")],
    ));
    create_template(Arc::new(Interpolation::new(joined)))
}

/// `<#macro cell value>[${value}]</#macro><#list items as n><@cell value=n/></#list>`
fn macro_calls() -> Arc<Template> {
    let cell_body: Arc<dyn Element> = Arc::new(Block::new(vec![
        Arc::new(Text::new("[")),
        Arc::new(Interpolation::new(var("value"))),
        Arc::new(Text::new("]")),
    ]));
    let cell = MacroDef::new(MacroDefinition::new(
        "cell",
        vec![MacroParam::required("value")],
        cell_body,
    ));
    let call: Arc<dyn Element> = Arc::new(MacroCall::new(
        var("cell"),
        CallSiteArgs::Named(vec![("value".to_string(), var("n"))]),
    ));
    create_template(Arc::new(Block::new(vec![
        Arc::new(cell),
        Arc::new(List::new(var("items"), "n", call)),
    ])))
}

fn bench_renders(c: &mut Criterion) {
    let templates = [
        ("list", plain_listing()),
        ("pipeline", builtin_pipeline()),
        ("macro", macro_calls()),
    ];

    for (name, template) in &templates {
        let mut group = c.benchmark_group(*name);
        for &size in SIZES {
            group.throughput(Throughput::Elements(size as u64));
            let data = items(size);
            group.bench_with_input(BenchmarkId::new("render", size), &data, |b, data| {
                b.iter(|| {
                    let mut out = Vec::with_capacity(size * 8);
                    template
                        .process(Some(black_box(data.clone())), &mut out)
                        .expect("benchmark template renders");
                    black_box(out)
                })
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_renders);
criterion_main!(benches);
