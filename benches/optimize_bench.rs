use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ruleforge::*;

const FIXTURE: &str = include_str!("../tests/fixtures/elements.json");

fn build_tree(reg: &Registry) -> Node {
    let num = |n: f64| Node::from(n);
    let call = |name: &str, args: Vec<Node>| Node::from(reg.build(name, args).unwrap());
    let player = || call("Event Player", vec![]);
    let folded = call("Add", vec![call("Multiply", vec![num(2.0), num(3.0)]), num(0.0)]);
    let offset = call(
        "Add",
        vec![
            call("Facing Direction Of", vec![player()]),
            call("Vector", vec![num(0.0), num(1.0), num(0.0)]),
        ],
    );
    let distance = call(
        "Distance Between",
        vec![offset, call("Vector", vec![folded, num(0.0), num(0.0)])],
    );
    let mut tree = distance;
    for i in 0..16 {
        tree = call("Max", vec![tree, call("Raise To Power", vec![num(f64::from(i)), num(2.0)])]);
    }
    tree
}

fn bench_build_optimize_emit(c: &mut Criterion) {
    let reg = Registry::from_json(FIXTURE).unwrap();
    let tree = build_tree(&reg);
    let variable = Node::from(reg.get_enum_member("Variable", "A").unwrap());
    let action = Node::from(reg.build("Set Global Variable", [variable, tree.clone()]).unwrap());
    let config = Config::default();

    c.bench_function("load_schema", |b| {
        b.iter(|| Registry::from_json(black_box(FIXTURE)).unwrap())
    });
    c.bench_function("build", |b| b.iter(|| build_tree(black_box(&reg))));
    c.bench_function("optimize", |b| {
        b.iter(|| black_box(tree.clone()).optimize(&reg))
    });
    c.bench_function("emit_rule_body", |b| {
        b.iter(|| emit_rule_body(&reg, &[], black_box(std::slice::from_ref(&action)), &config))
    });
}

criterion_group!(benches, bench_build_optimize_emit);
criterion_main!(benches);
