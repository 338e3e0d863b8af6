use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use weave_core::{
    ConfigRecord, ExecutionMode, Resource, ResourceKind, Texture, WeaveResult,
};
use weave_graph::{
    Executor, ExternalInputs, Pass, PassContext, PassDescriptor, PassReflection, PassRegistry,
    RenderGraph, SlotDesc,
};

/// Passes a color texture through, optionally blending in a second one.
struct Blend;

impl Pass for Blend {
    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(SlotDesc::new("a", ResourceKind::Color).optional())
            .input(SlotDesc::new("b", ResourceKind::Color).optional())
            .output(SlotDesc::new("out", ResourceKind::Color))
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        let (w, h) = ctx.default_size();
        let texture = match (ctx.input("a"), ctx.input("b")) {
            (Some(a), Some(b)) => {
                let mut t = a.texture.clone();
                for (dst, src) in t.data.iter_mut().zip(&b.texture.data) {
                    *dst = (*dst + src) * 0.5;
                }
                t
            }
            (Some(a), None) | (None, Some(a)) => a.texture.map_values(|v| v * 0.9),
            (None, None) => Texture::solid(w, h, [0.25, 0.5, 0.75, 1.0]),
        };
        ctx.set_output("out", Resource::color(texture));
        Ok(())
    }
}

fn registry() -> PassRegistry {
    let mut registry = PassRegistry::new();
    registry
        .register(PassDescriptor::new("Blend", "", |_| Ok(Box::new(Blend))))
        .unwrap();
    registry
}

/// A layered graph: `width` stages per layer, each fed by two stages of the previous layer.
fn layered_graph(layers: usize, width: usize) -> RenderGraph {
    let registry = registry();
    let mut graph = RenderGraph::new("layered");
    for layer in (0..layers).rev() {
        for i in 0..width {
            let stage = registry.create("Blend", &ConfigRecord::new()).unwrap();
            graph.add_stage(stage, format!("l{}_{}", layer, i)).unwrap();
        }
    }
    for layer in 1..layers {
        for i in 0..width {
            let dst = format!("l{}_{}", layer, i);
            graph
                .add_edge(&format!("l{}_{}.out", layer - 1, i), &format!("{}.a", dst))
                .unwrap();
            graph
                .add_edge(
                    &format!("l{}_{}.out", layer - 1, (i + 1) % width),
                    &format!("{}.b", dst),
                )
                .unwrap();
        }
    }
    for i in 0..width {
        graph
            .mark_output(&format!("l{}_{}.out", layers - 1, i))
            .unwrap();
    }
    graph
}

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("weave_schedule");
    for &(layers, width) in &[(8, 4), (32, 8), (64, 16)] {
        let graph = layered_graph(layers, width);
        group.bench_with_input(
            BenchmarkId::new("kahn", layers * width),
            &graph,
            |b, graph| b.iter(|| graph.schedule().unwrap()),
        );
    }
    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("weave_execute");
    group.sample_size(20);
    for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
        let mut graph = layered_graph(8, 8);
        let mut executor = Executor::new(256, 144).with_mode(mode);
        let external = ExternalInputs::new();
        group.bench_function(format!("{:?}_64_stages_256x144", mode), |b| {
            b.iter(|| executor.execute_frame(&mut graph, &external).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_schedule, bench_execute);
criterion_main!(benches);
