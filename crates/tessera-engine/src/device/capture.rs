/// Raw pixels of one rendered frame, tightly packed RGBA8 rows, top row first.
///
/// Encoding to an image file is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameCapture {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub pixels: Vec<u8>,
}

impl FrameCapture {
    /// RGBA of the pixel at `(x, y)`, if in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        self.pixels
            .get(i..i + 4)
            .and_then(|p| p.try_into().ok())
    }
}

/// Row pitch for texture-to-buffer copies.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Drops the per-row padding wgpu requires for buffer copies.
pub(crate) fn strip_row_padding(data: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<u8> {
    let row = (width * 4) as usize;
    let padded_row = padded_row as usize;
    let mut out = Vec::with_capacity(row * height as usize);
    for chunk in data.chunks(padded_row).take(height as usize) {
        out.extend_from_slice(&chunk[..row.min(chunk.len())]);
    }
    out
}
