use bioage::kdm::KdmFit;
use bioage::phenoage::PhenoAgeFit;
use bioage::{Dataset, canonical_panel, estimate_kdm, estimate_phenoage};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::{Array1, Array2};
use rand::distributions::Standard;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_cohort(n: usize) -> Dataset {
    let mut rng = StdRng::seed_from_u64(0xA6E5 + n as u64);
    let panel = canonical_panel();
    let age: Array1<f64> = (0..n).map(|_| rng.gen_range(20.0..85.0)).collect();
    let values = Array2::from_shape_fn((n, panel.len()), |_| {
        let jitter: f64 = rng.sample(Standard);
        1.0 + jitter
    });
    Dataset::new(
        (0..n).map(|i| i.to_string()).collect(),
        age,
        panel.names().to_vec(),
        values,
    )
    .expect("synthetic cohort is valid")
}

fn benchmark_estimators(c: &mut Criterion) {
    let sizes = [1_000_usize, 10_000, 100_000];
    let panel = canonical_panel();
    let cohorts: Vec<_> = sizes.iter().map(|&n| (n, random_cohort(n))).collect();

    let mut group = c.benchmark_group("estimators");
    for (n, cohort) in cohorts.iter() {
        group.throughput(Throughput::Elements(*n as u64));
        let kdm_fit = KdmFit::derive_default(cohort, &panel).expect("default fit");
        let pheno_fit = PhenoAgeFit::levine();

        group.bench_with_input(BenchmarkId::new("kdm", n), cohort, |b, input| {
            b.iter(|| {
                let result = estimate_kdm(black_box(input), &panel, Some(&kdm_fit));
                black_box(result).expect("kdm");
            });
        });

        group.bench_with_input(BenchmarkId::new("phenoage", n), cohort, |b, input| {
            b.iter(|| {
                let result = estimate_phenoage(black_box(input), &panel, Some(&pheno_fit));
                black_box(result).expect("phenoage");
            });
        });
    }
    group.finish();
}

criterion_group!(estimators, benchmark_estimators);
criterion_main!(estimators);
