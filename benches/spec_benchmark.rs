/*!
 * Provisioning Benchmarks
 * Spec assembly, serialization and cgroup resolution on the run path
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pod_sandbox::config::CgroupManager;
use pod_sandbox::core::id::generate_id;
use pod_sandbox::sandbox::annotations;
use pod_sandbox::security::{CgroupMode, CgroupResolver};
use pod_sandbox::spec::SpecGenerator;

fn annotated_spec(extra_annotations: usize) -> SpecGenerator {
    let id = generate_id();
    let mut spec = SpecGenerator::new_linux();
    spec.set_process_args(vec!["/pause".to_string()]);
    spec.set_hostname(&id[..12]);
    spec.add_annotation(annotations::SANDBOX_ID, id.as_str());
    spec.add_annotation(annotations::CONTAINER_TYPE, annotations::CONTAINER_TYPE_SANDBOX);
    for i in 0..extra_annotations {
        spec.add_annotation(format!("example.com/key-{}", i), format!("value-{}", i));
    }
    spec
}

fn bench_spec_assembly(c: &mut Criterion) {
    c.bench_function("spec_assembly", |b| {
        b.iter(|| black_box(annotated_spec(black_box(16))))
    });
}

fn bench_spec_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("spec_serialize");

    for count in [0usize, 16, 128, 1024] {
        let spec = annotated_spec(count);
        let size = spec.to_json().map(|bytes| bytes.len()).unwrap_or_default();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &spec, |b, spec| {
            b.iter(|| black_box(spec.to_json()))
        });
    }

    group.finish();
}

fn bench_cgroup_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("cgroup_resolve");
    let id = generate_id();

    let cgroupfs = CgroupResolver::new(CgroupManager::Cgroupfs, CgroupMode::Unified);
    group.bench_function("cgroupfs", |b| {
        b.iter(|| black_box(cgroupfs.resolve(black_box("/kubepods/burstable/pod1"), &id)))
    });

    let root = std::env::temp_dir().join("pod-sandbox-bench-cgroup");
    let systemd = CgroupResolver::with_mount_root(CgroupManager::Systemd, CgroupMode::Unified, root);
    group.bench_function("systemd", |b| {
        b.iter(|| {
            black_box(systemd.resolve(
                black_box("/kubepods.slice/kubepods-burstable.slice/kubepods-burstable-pod1.slice"),
                &id,
            ))
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_spec_assembly,
    bench_spec_serialize,
    bench_cgroup_resolve,
);

criterion_main!(benches);
