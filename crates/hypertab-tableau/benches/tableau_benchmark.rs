use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hypertab_model::{parse_knowledge_base, KnowledgeBase};
use hypertab_tableau::{Tableau, TableauConfig};
use std::sync::Arc;

/// Concept chain C0 -> ∃R.C1 -> ... -> ∃R.C0 closing a cycle of the given length
fn create_cyclic_knowledge_base(length: usize) -> KnowledgeBase {
    let mut source = String::from("C0('root').\n");
    for i in 0..length {
        let next = (i + 1) % length;
        source.push_str(&format!("C{}(x) -> >=1 R.C{}(x).\n", i, next));
        source.push_str(&format!("C{}(x) -> D{}(x) | E{}(x).\n", i, i, i));
        source.push_str(&format!("D{}(x), R(x,y) -> F(y).\n", i));
    }
    source.push_str("F(x), E0(x) -> false.\n");
    parse_knowledge_base(&source).unwrap()
}

/// n individuals in an R-chain with an at-most-one restriction
fn create_merge_knowledge_base(size: usize) -> KnowledgeBase {
    let mut source = String::from("R(x,y1), R(x,y2) -> y1 == y2.\n");
    for i in 0..size {
        source.push_str(&format!("R('hub','i{}').\n", i));
        source.push_str(&format!("A{}('i{}').\n", i % 3, i));
    }
    parse_knowledge_base(&source).unwrap()
}

/// Inverse existentials that force pairwise blocking over a wide tree
fn create_inverse_knowledge_base() -> KnowledgeBase {
    let source = "A('a'). A(x) -> >=1 R-.D(x). S-(x,y), D(y) -> C(x). B(x) -> >=1 R.C(x). \
                  D(x), R(x,y) -> A(y). S(x,y), D(y) -> A(x). A(x) -> >=2 S.D(x). \
                  D(x) -> >=1 R-.D(x). A(x) -> B(x).";
    parse_knowledge_base(source).unwrap()
}

fn benchmark_cyclic_saturation(c: &mut Criterion) {
    let sizes = vec![4, 16, 64];

    for size in sizes {
        let knowledge_base = Arc::new(create_cyclic_knowledge_base(size));
        c.bench_function(&format!("tableau_cyclic_{}_concepts", size), |b| {
            b.iter(|| {
                let mut tableau = Tableau::new(Arc::clone(&knowledge_base), TableauConfig::default()).unwrap();
                let _result = tableau.is_satisfiable().unwrap();
                black_box(tableau.statistics().steps)
            });
        });
    }
}

fn benchmark_merging(c: &mut Criterion) {
    let sizes = vec![10, 100];

    for size in sizes {
        let knowledge_base = Arc::new(create_merge_knowledge_base(size));
        c.bench_function(&format!("tableau_merge_{}_individuals", size), |b| {
            b.iter(|| {
                let mut tableau = Tableau::new(Arc::clone(&knowledge_base), TableauConfig::default()).unwrap();
                black_box(tableau.is_satisfiable().unwrap())
            });
        });
    }
}

fn benchmark_pairwise_blocking(c: &mut Criterion) {
    let knowledge_base = Arc::new(create_inverse_knowledge_base());
    c.bench_function("tableau_pairwise_inverse_roles", |b| {
        b.iter(|| {
            let mut tableau = Tableau::new(Arc::clone(&knowledge_base), TableauConfig::default()).unwrap();
            black_box(tableau.is_satisfiable().unwrap())
        });
    });
}

criterion_group!(benches, benchmark_cyclic_saturation, benchmark_merging, benchmark_pairwise_blocking);
criterion_main!(benches);
