use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dirsnap_common::{FileNode, SearchRoot, WalkerConfig};
use dirsnap_core::{
    ComparisonEngine, DirectoryWalker, MemoryVfs, MetadataComparator, SnapshotBuilder, WalkSession,
};
use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// Helper to create test directory structure
fn create_test_tree(root: &Path, depth: usize, files_per_dir: usize, file_size: usize) {
    if depth == 0 {
        return;
    }

    for i in 0..files_per_dir {
        let file_path = root.join(format!("file_{}.txt", i));
        let mut file = fs::File::create(&file_path).unwrap();
        let content = vec![b'x'; file_size];
        file.write_all(&content).unwrap();
    }

    if depth > 1 {
        for i in 0..3 {
            let dir_path = root.join(format!("subdir_{}", i));
            fs::create_dir(&dir_path).unwrap();
            create_test_tree(&dir_path, depth - 1, files_per_dir, file_size);
        }
    }
}

// In-memory tree with `files` files spread over ten folders
fn memory_tree(root: &str, files: usize, rename_every: usize) -> MemoryVfs {
    (0..files).fold(MemoryVfs::new().with_dir(root), |vfs, i| {
        let name = if rename_every > 0 && i % rename_every == 0 {
            format!("renamed_{}.txt", i)
        } else {
            format!("file_{}.txt", i)
        };
        vfs.with_file(PathBuf::from(root).join(format!("dir_{}", i % 10)).join(name), 1024)
    })
}

fn snapshot(vfs: MemoryVfs, root: &str) -> FileNode {
    SnapshotBuilder::with_vfs(Arc::new(vfs))
        .build(Path::new(root))
        .unwrap()
}

fn bench_snapshot_local(c: &mut Criterion) {
    c.bench_function("snapshot_local_tree_130_files", |b| {
        let temp = TempDir::new().unwrap();
        create_test_tree(temp.path(), 3, 10, 1024);
        let builder = SnapshotBuilder::new();

        b.iter(|| {
            let tree = builder.build(black_box(temp.path())).unwrap();
            black_box(tree);
        });
    });
}

fn bench_walk_local(c: &mut Criterion) {
    c.bench_function("walk_local_tree_130_files", |b| {
        let temp = TempDir::new().unwrap();
        create_test_tree(temp.path(), 3, 10, 1024);
        let walker = DirectoryWalker::new(
            WalkerConfig::default()
                .with_root(SearchRoot::recursive(temp.path()))
                .with_extensions([".txt"]),
        );

        b.iter(|| {
            let mut events = Vec::new();
            let report = walker.walk_with(&mut events, &WalkSession::new()).unwrap();
            black_box((events, report));
        });
    });
}

fn bench_diff_identical(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_identical");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let source = snapshot(memory_tree("/src", size, 0), "/src");
            let destination = snapshot(memory_tree("/dst", size, 0), "/dst");
            let engine = ComparisonEngine::new().with_comparator(MetadataComparator);

            b.iter(|| {
                let result = engine
                    .compare_snapshots(black_box(&source), black_box(&destination))
                    .unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

fn bench_diff_with_renames(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_with_renames");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let source = snapshot(memory_tree("/src", size, 7), "/src");
            let destination = snapshot(memory_tree("/dst", size, 0), "/dst");
            let engine = ComparisonEngine::new();

            b.iter(|| {
                let result = engine
                    .compare_snapshots(black_box(&source), black_box(&destination))
                    .unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

criterion_group!(traversal_benches, bench_snapshot_local, bench_walk_local);

criterion_group!(diff_benches, bench_diff_identical, bench_diff_with_renames);

criterion_main!(traversal_benches, diff_benches);
