use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stagehand::bridge::{ContextBlob, Invocation};
use stagehand::core::{InvocationStrategy, PayloadFormat, Stage, TeamMemory};

fn memory_with_history(stages: usize) -> TeamMemory {
    let mut memory = TeamMemory::new("benchmark task", "workflow-rules/core.md");
    for i in 0..stages {
        let name = format!("stage-{i}");
        memory.record_output(&name, "## SUMMARY\n- did things\n".repeat(20));
        memory.append_record(stagehand::core::ExecutionRecord::succeeded(&name, chrono::Utc::now()));
    }
    memory
}

fn bench_payloads(c: &mut Criterion) {
    let memory = memory_with_history(6);
    let stage = Stage::new("reviewer", "tool")
        .with_role_prompt("You review.")
        .with_workflow_rules(vec!["workflow-rules/core.md".into()])
        .with_invocation(InvocationStrategy::PositionalArgument);
    let blob = ContextBlob::new(&stage, "benchmark task", &memory);

    c.bench_function("payload_json", |b| {
        b.iter(|| black_box(&blob).encode(PayloadFormat::Json))
    });
    c.bench_function("payload_prompt", |b| {
        b.iter(|| black_box(&blob).encode(PayloadFormat::Prompt))
    });
    c.bench_function("snapshot_and_plan", |b| {
        b.iter(|| {
            let blob = ContextBlob::new(&stage, "benchmark task", black_box(&memory));
            let payload = blob.encode(PayloadFormat::Prompt).unwrap_or_default();
            Invocation::plan(&stage, payload)
        })
    });
}

criterion_group!(benches, bench_payloads);
criterion_main!(benches);
