use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use prism_image::RasterImage;
use prism_imgproc::{denoise, filter, histogram};

fn bench_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("Spatial Filters");

    for (width, height) in [(256, 224), (512, 448), (1024, 896)].iter() {
        for kernel_size in [3, 5, 9].iter() {
            group.throughput(criterion::Throughput::Elements(
                (*width * *height * *kernel_size) as u64,
            ));

            let parameter_string = format!("{}x{}x{}", width, height, kernel_size);

            let image_data = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
            let image = RasterImage::new([*width, *height].into(), 3, image_data).unwrap();

            group.bench_with_input(
                BenchmarkId::new("gaussian_blur", &parameter_string),
                &image,
                |b, i| b.iter(|| black_box(filter::gaussian_blur(i, *kernel_size, 1.5))),
            );

            group.bench_with_input(
                BenchmarkId::new("median_blur", &parameter_string),
                &image,
                |b, i| b.iter(|| black_box(filter::median_blur(i, *kernel_size))),
            );

            group.bench_with_input(
                BenchmarkId::new("bilateral_filter", &parameter_string),
                &image,
                |b, i| {
                    b.iter(|| black_box(filter::bilateral_filter(i, *kernel_size as i32, 75.0, 75.0)))
                },
            );
        }
    }
    group.finish();
}

fn bench_histogram(c: &mut Criterion) {
    let mut group = c.benchmark_group("Histogram");

    for (width, height) in [(256, 224), (512, 448)].iter() {
        group.throughput(criterion::Throughput::Elements((*width * *height) as u64));
        let parameter_string = format!("{}x{}", width, height);

        let image_data = (0..width * height).map(|i| (i % 199) as u8).collect();
        let image = RasterImage::new([*width, *height].into(), 1, image_data).unwrap();

        group.bench_with_input(
            BenchmarkId::new("equalize_clahe", &parameter_string),
            &image,
            |b, i| b.iter(|| black_box(histogram::equalize_clahe(i, 2.0, 8))),
        );

        group.bench_with_input(
            BenchmarkId::new("equalize_adaptive", &parameter_string),
            &image,
            |b, i| b.iter(|| black_box(histogram::equalize_adaptive(i, 15))),
        );

        group.bench_with_input(
            BenchmarkId::new("non_local_means", &parameter_string),
            &image,
            |b, i| b.iter(|| black_box(denoise::non_local_means(i, 10.0, 7, 21))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_filters, bench_histogram);
criterion_main!(benches);
