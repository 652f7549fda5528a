use benchmark_simple::*;
use jwt_keyring::prelude::*;

fn bench_family(bench: &Bench, options: &Options, name: &str, key: impl Into<Algorithm>) {
    let keys = JWTKeyCollection::new();
    keys.add_signer(key, Some(name));
    let claims = Claims::create(Duration::from_hours(2));
    let token = keys.sign(&claims, None, None).unwrap();

    let res = bench.run(options, || keys.sign(&claims, None, None).unwrap());
    println!("{} - sign: {}", name, res.throughput(1));

    let res = bench.run(options, || {
        keys.verify::<JWTClaims<NoCustomClaims>>(&token).unwrap()
    });
    println!("{} - verify: {}", name, res.throughput(1));
}

fn main() {
    let bench = Bench::new();

    let options = &Options {
        iterations: 1000,
        warmup_iterations: 100,
        min_samples: 5,
        max_samples: 10,
        max_rsd: 1.0,
        ..Default::default()
    };

    bench_family(&bench, options, "hs256", HMACKey::generate(HashFunction::SHA256));
    bench_family(&bench, options, "es256", ECDSAKey::generate(ECDSACurve::P256).unwrap());
    bench_family(&bench, options, "es384", ECDSAKey::generate(ECDSACurve::P384).unwrap());
    bench_family(&bench, options, "eddsa", EdDSAKey::generate());
    bench_family(
        &bench,
        options,
        "rs256-2048",
        RSAKey::generate(2048, RSAPadding::PKCS1, HashFunction::SHA256).unwrap(),
    );
    bench_family(&bench, options, "ml-dsa-65", MLDSAKey::generate(MLDSAVariant::MLDSA65));

    // JWK entries are materialized once, then served from the cache
    let jwk = ECDSAKey::generate(ECDSACurve::P256)
        .unwrap()
        .public_jwk()
        .unwrap()
        .with_key_id("jwk");
    let keys = JWTKeyCollection::new();
    keys.add_jwk(jwk, None).unwrap();
    let res = bench.run(options, || keys.signer(Some("jwk"), None).unwrap());
    println!("jwk - resolve: {}", res.throughput(1));
}
