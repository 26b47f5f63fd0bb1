//! Byte-level randomness source for join-collision backoff.

/// Minimal randomness collaborator: the MAC only ever needs a handful of
/// random bytes at a time (backoff exponent sampling), so the trait is
/// kept narrower than [`rand_core::RngCore`] while still composable with
/// it.
pub trait Rng {
    /// Fill `dest` with random bytes.
    fn fill_bytes(&mut self, dest: &mut [u8]);

    /// A random `u32`, built from four bytes of [`fill_bytes`](Self::fill_bytes).
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }
}

impl<T: rand_core::RngCore> Rng for T {
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        rand_core::RngCore::fill_bytes(self, dest)
    }

    fn next_u32(&mut self) -> u32 {
        rand_core::RngCore::next_u32(self)
    }
}

/// Adapter over the process-wide RNG singleton, for platform integrations
/// that register one `rand_facade::GlobalRng` source and want every MAC
/// instance to share it rather than owning a dedicated generator each.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalRng;

impl Rng for GlobalRng {
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        rand_core::RngCore::fill_bytes(&mut rand_facade::GlobalRng::get(), dest)
    }

    fn next_u32(&mut self) -> u32 {
        rand_facade::GlobalRng::get().next_u32()
    }
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::Rng;

    /// Deterministic byte source for tests: cycles through a fixed script,
    /// repeating the last byte once exhausted rather than panicking.
    #[derive(Debug, Clone)]
    pub struct MockRng {
        script: heapless::Vec<u8, 64>,
        pos: usize,
    }

    impl MockRng {
        pub fn new(script: &[u8]) -> Self {
            let mut v = heapless::Vec::new();
            for &b in script {
                let _ = v.push(b);
            }
            Self { script: v, pos: 0 }
        }
    }

    impl Rng for MockRng {
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for d in dest.iter_mut() {
                let last = *self.script.last().unwrap_or(&0);
                *d = self.script.get(self.pos).copied().unwrap_or(last);
                if self.pos + 1 < self.script.len() {
                    self.pos += 1;
                }
            }
        }
    }

    #[test]
    fn repeats_last_byte_once_exhausted() {
        let mut r = MockRng::new(&[1, 2, 3]);
        let mut buf = [0u8; 5];
        r.fill_bytes(&mut buf);
        assert_eq!(buf, [1, 2, 3, 3, 3]);
    }
}
