//! Checking throughput on decorator-heavy modules

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use paramspec::compiler::frontend::Config;
use paramspec::{ParallelAnalyzer, TypeChecker};
use std::fs;
use tempfile::TempDir;

const HEADER: &str = r#"from typing import Callable, Generic, ParamSpec, TypeVar
from functools import wraps

P = ParamSpec("P")
R = TypeVar("R")

def logged(f: Callable[P, R]) -> Callable[P, R]:
    @wraps(f)
    def inner(*args: P.args, **kwargs: P.kwargs) -> R:
        return f(*args, **kwargs)
    return inner

def call(f: Callable[P, R], /, *args: P.args, **kwargs: P.kwargs) -> R:
    return f(*args, **kwargs)

class Job(Generic[P, R]):
    def __init__(self, fn: Callable[P, R]) -> None:
        self.fn = fn

    def run(self, *args: P.args, **kwargs: P.kwargs) -> R: ...
"#;

fn generate_module(functions: usize) -> String {
    let mut content = String::from(HEADER);
    for i in 0..functions {
        content.push_str(&format!(
            r#"
@logged
@logged
def handler_{i}(request: int, name: str = "x", *, retries: int = 3) -> str:
    return name

result_{i} = handler_{i}({i}, "a", retries=1)
direct_{i} = call(handler_{i}, {i}, name="b")
job_{i} = Job(handler_{i})
job_{i}.run({i})
"#,
            i = i
        ));
    }
    content
}

fn bench_single_module(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_module");

    for size in [10, 100, 500] {
        let source = generate_module(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, source| {
            b.iter(|| {
                let mut checker = TypeChecker::new(source);
                black_box(checker.check_source(black_box(source)).len())
            })
        });
    }

    group.finish();
}

fn bench_parallel_files(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    for i in 0..32 {
        fs::write(dir.path().join(format!("module_{}.py", i)), generate_module(50)).unwrap();
    }
    let paths = vec![dir.path().to_path_buf()];

    let mut group = c.benchmark_group("check_files");
    for parallel in [false, true] {
        let analyzer = ParallelAnalyzer::new(Config::default()).with_parallel(parallel);
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| {
            b.iter(|| black_box(analyzer.analyze_paths(&paths).unwrap().len()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_module, bench_parallel_files);
criterion_main!(benches);
