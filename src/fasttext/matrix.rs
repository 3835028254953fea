//! Dense and product-quantized weight matrices

use super::reader::{ModelReader, checked_len, invalid_data, out_of_memory};
use std::io::{self, Read};

/// Centroids per sub-quantizer (8-bit codes)
const KSUB: usize = 256;

/// Weight matrix as stored in a model file
#[derive(Debug)]
pub(crate) enum Matrix {
    Dense(DenseMatrix),
    Quantized(QuantMatrix),
}

impl Matrix {
    pub(crate) fn read<R: Read>(reader: &mut ModelReader<R>, quantized: bool) -> io::Result<Self> {
        if quantized {
            QuantMatrix::read(reader).map(Matrix::Quantized)
        } else {
            DenseMatrix::read(reader).map(Matrix::Dense)
        }
    }

    pub(crate) fn rows(&self) -> usize {
        match self {
            Matrix::Dense(m) => m.rows,
            Matrix::Quantized(m) => m.rows,
        }
    }

    pub(crate) fn cols(&self) -> usize {
        match self {
            Matrix::Dense(m) => m.cols,
            Matrix::Quantized(m) => m.cols,
        }
    }

    /// `target += row(i)`; `i` must be below [`Matrix::rows`]
    pub(crate) fn add_row(&self, target: &mut [f32], i: usize) {
        match self {
            Matrix::Dense(m) => {
                for (t, w) in target.iter_mut().zip(m.row(i)) {
                    *t += w;
                }
            }
            Matrix::Quantized(m) => m.pq.add_code(target, m.codes(i), m.norm(i)),
        }
    }

    /// `row(i) · v`; `i` must be below [`Matrix::rows`]
    pub(crate) fn dot_row(&self, v: &[f32], i: usize) -> f32 {
        match self {
            Matrix::Dense(m) => m.row(i).iter().zip(v).map(|(w, x)| w * x).sum(),
            Matrix::Quantized(m) => m.pq.mul_code(v, m.codes(i), m.norm(i)),
        }
    }
}

#[derive(Debug)]
pub(crate) struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    fn read<R: Read>(reader: &mut ModelReader<R>) -> io::Result<Self> {
        let rows = checked_len(reader.read_i64()?, "matrix rows")?;
        let cols = checked_len(reader.read_i64()?, "matrix cols")?;
        let len = rows
            .checked_mul(cols)
            .ok_or_else(|| invalid_data("dense matrix size overflows"))?;
        let data = reader.read_f32_vec(len)?;
        Ok(Self { rows, cols, data })
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }
}

/// Product quantizer: each row is split into `nsubq` sub-vectors, each
/// replaced by the index of its nearest centroid
#[derive(Debug)]
pub(crate) struct ProductQuantizer {
    nsubq: usize,
    dsub: usize,
    lastdsub: usize,
    centroids: Vec<f32>,
}

impl ProductQuantizer {
    fn read<R: Read>(reader: &mut ModelReader<R>) -> io::Result<Self> {
        let dim = checked_len(reader.read_i32()?.into(), "quantizer dim")?;
        let nsubq = checked_len(reader.read_i32()?.into(), "quantizer nsubq")?;
        let dsub = checked_len(reader.read_i32()?.into(), "quantizer dsub")?;
        let lastdsub = checked_len(reader.read_i32()?.into(), "quantizer lastdsub")?;

        if nsubq == 0 || dsub == 0 || lastdsub == 0 || (nsubq - 1) * dsub + lastdsub != dim {
            return Err(invalid_data(format!(
                "inconsistent quantizer layout: dim={} nsubq={} dsub={} lastdsub={}",
                dim, nsubq, dsub, lastdsub
            )));
        }

        let centroids = reader.read_f32_vec(dim * KSUB)?;
        Ok(Self {
            nsubq,
            dsub,
            lastdsub,
            centroids,
        })
    }

    fn dim(&self) -> usize {
        (self.nsubq - 1) * self.dsub + self.lastdsub
    }

    fn centroid(&self, m: usize, code: u8) -> &[f32] {
        let code = code as usize;
        if m == self.nsubq - 1 {
            let start = m * KSUB * self.dsub + code * self.lastdsub;
            &self.centroids[start..start + self.lastdsub]
        } else {
            let start = (m * KSUB + code) * self.dsub;
            &self.centroids[start..start + self.dsub]
        }
    }

    fn add_code(&self, x: &mut [f32], codes: &[u8], alpha: f32) {
        for (m, &code) in codes.iter().enumerate() {
            let offset = m * self.dsub;
            for (n, c) in self.centroid(m, code).iter().enumerate() {
                x[offset + n] += alpha * c;
            }
        }
    }

    fn mul_code(&self, x: &[f32], codes: &[u8], alpha: f32) -> f32 {
        let mut res = 0.0;
        for (m, &code) in codes.iter().enumerate() {
            let offset = m * self.dsub;
            for (n, c) in self.centroid(m, code).iter().enumerate() {
                res += x[offset + n] * c;
            }
        }
        res * alpha
    }
}

#[derive(Debug)]
pub(crate) struct QuantMatrix {
    rows: usize,
    cols: usize,
    codes: Vec<u8>,
    pq: ProductQuantizer,
    /// Per-row norm codes and their scalar quantizer
    norms: Option<(Vec<u8>, ProductQuantizer)>,
}

impl QuantMatrix {
    fn read<R: Read>(reader: &mut ModelReader<R>) -> io::Result<Self> {
        let qnorm = reader.read_bool()?;
        let rows = checked_len(reader.read_i64()?, "matrix rows")?;
        let cols = checked_len(reader.read_i64()?, "matrix cols")?;
        let codesize = checked_len(reader.read_i32()?.into(), "code size")?;
        let codes = reader.read_bytes(codesize)?;
        let pq = ProductQuantizer::read(reader)?;

        if pq.dim() != cols {
            return Err(invalid_data(format!(
                "quantizer dim {} does not match matrix cols {}",
                pq.dim(),
                cols
            )));
        }
        if rows.checked_mul(pq.nsubq) != Some(codesize) {
            return Err(invalid_data(format!(
                "code size {} does not match {} rows x {} sub-quantizers",
                codesize, rows, pq.nsubq
            )));
        }

        let norms = if qnorm {
            let norm_codes = reader.read_bytes(rows)?;
            let npq = ProductQuantizer::read(reader)?;
            if npq.dim() != 1 {
                return Err(invalid_data("norm quantizer must be one-dimensional"));
            }
            Some((norm_codes, npq))
        } else {
            None
        };

        Ok(Self {
            rows,
            cols,
            codes,
            pq,
            norms,
        })
    }

    fn codes(&self, i: usize) -> &[u8] {
        &self.codes[i * self.pq.nsubq..(i + 1) * self.pq.nsubq]
    }

    fn norm(&self, i: usize) -> f32 {
        match &self.norms {
            Some((codes, npq)) => npq.centroid(0, codes[i])[0],
            None => 1.0,
        }
    }
}

/// Reserve a zeroed vector without aborting on allocation failure
pub(crate) fn zeroed(len: usize) -> io::Result<Vec<f32>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(out_of_memory)?;
    v.resize(len, 0.0);
    Ok(v)
}
