//! Host / network byte-order conversion for wire integers.
//!
//! Everything multi-byte on the wire is big-endian. Conversion is an identity
//! on big-endian hosts and a byte reversal on little-endian hosts; 8-bit
//! values are always an identity. Enumerations cross the wire through their
//! `u8` representation and do not need conversion.

/// A fixed-width unsigned integer that crosses the wire in network
/// (big-endian) byte order.
pub trait WireInt: Copy + Eq + Sized {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Converts a host-order value to network order.
    #[must_use]
    fn host_to_network(self) -> Self;

    /// Converts a network-order value back to host order.
    #[must_use]
    fn network_to_host(self) -> Self;

    /// Writes the network-order encoding into the first `WIDTH` bytes of `out`.
    fn put(self, out: &mut [u8]);

    /// Reads a network-order encoding from the first `WIDTH` bytes of `src`.
    #[must_use]
    fn get(src: &[u8]) -> Self;
}

macro_rules! wire_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WireInt for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn host_to_network(self) -> Self {
                    self.to_be()
                }

                fn network_to_host(self) -> Self {
                    Self::from_be(self)
                }

                fn put(self, out: &mut [u8]) {
                    out[..Self::WIDTH].copy_from_slice(&self.to_be_bytes());
                }

                fn get(src: &[u8]) -> Self {
                    let mut bytes = [0u8; Self::WIDTH];
                    bytes.copy_from_slice(&src[..Self::WIDTH]);
                    Self::from_be_bytes(bytes)
                }
            }
        )*
    };
}

wire_int!(u8, u16, u32, u64);
