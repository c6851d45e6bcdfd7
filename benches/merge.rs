use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use nalgebra::Point3;
use stenomesh::encoding::{self, stl::StlEncoding};
use stenomesh::prelude::*;

const RESOLUTION: usize = 128;
const TOLERANCE: f64 = 1e-4;

// Triangle soup of a square grid, as read from STL. Every position is repeated
// by each face that shares it and is slightly perturbed.
fn soup() -> Mesh {
    let mut mesh = Mesh::new();
    let jitter = |x: usize, y: usize, corner: usize| ((x * 31 + y * 17 + corner * 7) % 5) as f32 * 1e-6;
    for x in 0..RESOLUTION {
        for y in 0..RESOLUTION {
            let corners = [(x, y), (x + 1, y), (x + 1, y + 1), (x, y + 1)];
            for triangle in [[0, 1, 2], [0, 2, 3]] {
                let face = triangle.map(|corner| {
                    let (u, v) = corners[corner];
                    mesh.push_vertex(Point3::new(
                        u as f32 + jitter(x, y, corner),
                        v as f32,
                        0.0,
                    ))
                    .unwrap()
                });
                mesh.push_face(&face).unwrap();
            }
        }
    }
    mesh
}

fn merge(mut mesh: Mesh) {
    mesh.merge_vertices(TOLERANCE).unwrap();
}

fn transcode(mesh: Mesh) {
    let mut stl = Vec::new();
    mesh.to_stl(&StlEncoding::default(), &mut stl).unwrap();
    encoding::decode(stl.as_slice()).unwrap();
}

fn benchmark(criterion: &mut Criterion) {
    criterion.bench_function("merge", move |bencher| {
        bencher.iter_batched(soup, merge, BatchSize::LargeInput)
    });
    criterion.bench_function("transcode", move |bencher| {
        bencher.iter_batched(
            || {
                let mut mesh = soup();
                mesh.message = Some(vec![0x5A; 1024]);
                mesh
            },
            transcode,
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
