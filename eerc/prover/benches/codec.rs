//! Criterion benchmarks for the client codecs
//!
//! Run with: cargo bench -p eerc-prover

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use eerc_prover::{Field, KeyPair, PrivateKey, Scalar, elgamal, pct};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn keypair() -> KeyPair {
    KeyPair::from_private(PrivateKey::from_scalar(Scalar::from(0xBEEFu64)).expect("non-zero"))
}

fn bench_elgamal_decrypt(c: &mut Criterion) {
    let kp = keypair();
    let mut rng = ChaCha20Rng::from_seed([1u8; 32]);
    elgamal::warm_up();

    let mut group = c.benchmark_group("elgamal_decrypt");
    group.throughput(Throughput::Elements(1));
    group.sample_size(20);

    for amount in [0u64, 12_345, 999_999_999] {
        let (ct, _) = elgamal::encrypt(&kp.public, amount, &mut rng).expect("encrypt");
        group.bench_with_input(BenchmarkId::from_parameter(amount), &ct, |b, ct| {
            b.iter(|| {
                let v = elgamal::decrypt(black_box(&kp.private), black_box(ct)).expect("decrypt");
                black_box(v)
            });
        });
    }

    group.finish();
}

fn bench_pct_pack(c: &mut Criterion) {
    let kp = keypair();
    let mut rng = ChaCha20Rng::from_seed([2u8; 32]);

    let mut group = c.benchmark_group("pct");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::from_parameter("pack"), |b| {
        b.iter(|| {
            let packet = pct::pack(black_box(&[Field::from(100u64)]), &kp.public, &mut rng)
                .expect("pack");
            black_box(packet)
        });
    });

    let packet = pct::pack(&[Field::from(100u64)], &kp.public, &mut rng).expect("pack");
    let arr = packet.to_pct().expect("pct").to_array();
    group.bench_function(BenchmarkId::from_parameter("decrypt"), |b| {
        b.iter(|| black_box(pct::decrypt_pct(&kp.private, black_box(&arr)).expect("decrypt")));
    });

    group.finish();
}

criterion_group!(benches, bench_elgamal_decrypt, bench_pct_pack);
criterion_main!(benches);
