//! The fallback parser: buffers the body as opaque bytes for any
//! content-type with no dedicated parser (when strict mode is off).

pub fn parse(bytes: &[u8]) -> Vec<u8> {
    bytes.to_vec()
}
