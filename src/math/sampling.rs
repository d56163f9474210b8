//! Space-filling designs on the unit hypercube.

use rand::Rng;

/// Latin hypercube sample of `n` points in `[0, 1]^dim`.
///
/// Each axis is split into `n` equal strata and every stratum is hit exactly
/// once; strata are paired across axes by independent shuffles.
pub fn latin_hypercube<R: Rng + ?Sized>(n: usize, dim: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let mut points = vec![vec![0.0; dim]; n];
    if n == 0 {
        return points;
    }
    let mut strata: Vec<usize> = (0..n).collect();
    for d in 0..dim {
        // Fisher-Yates.
        for i in (1..n).rev() {
            let j = rng.gen_range(0..=i);
            strata.swap(i, j);
        }
        for (point, &s) in points.iter_mut().zip(strata.iter()) {
            let jitter: f64 = rng.gen_range(0.0..1.0);
            point[d] = (s as f64 + jitter) / n as f64;
        }
    }
    points
}

/// Uniform random point in `[0, 1]^dim`.
pub fn uniform_point<R: Rng + ?Sized>(dim: usize, rng: &mut R) -> Vec<f64> {
    (0..dim).map(|_| rng.gen_range(0.0..1.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn latin_hypercube_hits_every_stratum_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 10;
        let pts = latin_hypercube(n, 4, &mut rng);
        assert_eq!(pts.len(), n);
        for d in 0..4 {
            let mut seen = vec![false; n];
            for p in &pts {
                assert!((0.0..1.0).contains(&p[d]));
                let s = (p[d] * n as f64).floor() as usize;
                assert!(!seen[s], "stratum {s} hit twice on axis {d}");
                seen[s] = true;
            }
        }
    }
}
