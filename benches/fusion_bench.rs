use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use indexmap::IndexMap;

use graphfuse::{
    evaluate, BackendKind, Callable, CompilerOptions, Key, SubgraphCompiler, Task, TaskGraph,
    Value,
};

fn scale() -> Callable {
    Callable::with_arity("scale", 2, |args| {
        let a = args[0].as_array()?;
        let factor = args[1].as_float()?;
        Ok(Value::array(a.iter().map(|x| x * factor).collect::<Vec<_>>()))
    })
}

/// input -> step0 -> step1 -> ... -> step{len-1}
fn chain(len: usize) -> TaskGraph {
    (0..len)
        .map(|i| {
            let prev = if i == 0 {
                "input".to_string()
            } else {
                format!("step{}", i - 1)
            };
            (format!("step{}", i), Task::new(scale()).key(prev).literal(1.0001))
        })
        .collect()
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    let input = Value::array(vec![1.0; 64]);

    for len in [4, 16, 64] {
        let graph = chain(len);
        let output = Key::from(format!("step{}", len - 1));

        group.bench_with_input(BenchmarkId::new("evaluate", len), &len, |b, _| {
            let mut inputs = IndexMap::new();
            inputs.insert(Key::from("input"), input.clone());
            b.iter(|| black_box(evaluate(&graph, &output, &inputs).unwrap()));
        });

        let mut backends = vec![("interpreter", BackendKind::Interpreter)];
        #[cfg(feature = "jit")]
        backends.push(("jit", BackendKind::Jit));

        for (name, backend) in backends {
            let compiler = SubgraphCompiler::with_options(CompilerOptions::new().backend(backend));
            let fused = compiler
                .compile_subgraph(&graph, &[Key::from("input")], &output)
                .unwrap();
            let args = [input.clone()];

            group.bench_with_input(BenchmarkId::new(name, len), &len, |b, _| {
                b.iter(|| black_box(fused.call(&args).unwrap()));
            });
        }
    }

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let mut backends = vec![("interpreter", BackendKind::Interpreter)];
    #[cfg(feature = "jit")]
    backends.push(("jit", BackendKind::Jit));

    for len in [64, 1024] {
        let graph = chain(len);
        let output = Key::from(format!("step{}", len - 1));

        for (name, backend) in backends.iter().copied() {
            // One backend per benchmark, so the JIT kernel is only built on the first iteration
            let compiler = SubgraphCompiler::with_options(CompilerOptions::new().backend(backend));
            group.bench_with_input(BenchmarkId::new(name, len), &len, |b, _| {
                b.iter(|| {
                    black_box(
                        compiler
                            .compile_subgraph(&graph, &[Key::from("input")], &output)
                            .unwrap(),
                    )
                });
            });
        }
    }

    #[cfg(feature = "jit")]
    group.bench_function("jit_kernel", |b| {
        let compiler = graphfuse::backend::jit::KernelCompiler::new().unwrap();
        b.iter(|| black_box(compiler.compile().unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_chain, bench_compile);
criterion_main!(benches);
