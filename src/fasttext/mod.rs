//! Pure-Rust reader and predictor for fastText supervised models
//!
//! Supports the `.bin` and quantized `.ftz` formats written by fastText
//! 0.9.x (format version 12) for all four loss functions. Training, vector
//! lookup and autotune metadata are out of scope; only what `predict` needs
//! is decoded.

mod dictionary;
mod loss;
mod matrix;
mod reader;

use crate::backend::{LanguageModel, ModelBackend, RawPrediction};
use crate::error::{Error, Result};
use dictionary::{Dictionary, SubwordParams};
use loss::Loss;
use matrix::{Matrix, zeroed};
use reader::{ModelReader, checked_len, invalid_data};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;

const FASTTEXT_MAGIC: i32 = 793_712_314;
const FASTTEXT_VERSION: i32 = 12;
const SUPERVISED: i32 = 3;

/// Training arguments stored in the model header
#[derive(Debug)]
struct Args {
    dim: usize,
    word_ngrams: usize,
    loss: i32,
    bucket: usize,
    minn: usize,
    maxn: usize,
}

impl Args {
    fn read<R: Read>(reader: &mut ModelReader<R>, version: i32) -> io::Result<Self> {
        let dim = reader.read_i32()?;
        let _ws = reader.read_i32()?;
        let _epoch = reader.read_i32()?;
        let _min_count = reader.read_i32()?;
        let _neg = reader.read_i32()?;
        let word_ngrams = reader.read_i32()?;
        let loss = reader.read_i32()?;
        let model = reader.read_i32()?;
        let bucket = reader.read_i32()?;
        let minn = reader.read_i32()?;
        let mut maxn = reader.read_i32()?;
        let _lr_update_rate = reader.read_i32()?;
        let _t = reader.read_f64()?;

        if model != SUPERVISED {
            return Err(invalid_data(format!(
                "model type {} is not supervised; only classifiers can predict",
                model
            )));
        }
        // Version 11 supervised models were trained without char n-grams
        if version == 11 {
            maxn = 0;
        }

        Ok(Self {
            dim: checked_len(dim.into(), "dim")?,
            word_ngrams: checked_len(word_ngrams.into(), "wordNgrams")?,
            loss,
            bucket: checked_len(bucket.into(), "bucket")?,
            minn: checked_len(minn.into(), "minn")?,
            maxn: checked_len(maxn.into(), "maxn")?,
        })
    }
}

/// A fastText classifier loaded into memory
#[derive(Debug)]
pub struct FastTextModel {
    dict: Dictionary,
    input: Matrix,
    output: Matrix,
    loss: Loss,
    dim: usize,
}

impl FastTextModel {
    /// Load a `.bin` or `.ftz` model from disk
    ///
    /// Allocation failures are reported as [`Error::OutOfMemory`]; malformed
    /// or truncated files as [`Error::InvalidModel`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let len = file.metadata().map_err(|e| Error::io(path, e))?.len();
        let mut reader = ModelReader::new(BufReader::new(file), len);

        let model = Self::read(&mut reader).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => Error::InvalidModel {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
            _ => Error::io(path, e),
        })?;

        debug!(
            path = %path.display(),
            words = model.dict.nwords(),
            labels = model.dict.nlabels(),
            dim = model.dim,
            "Loaded fastText model"
        );
        Ok(model)
    }

    fn read<R: Read>(reader: &mut ModelReader<R>) -> io::Result<Self> {
        let magic = reader.read_i32()?;
        if magic != FASTTEXT_MAGIC {
            return Err(invalid_data("not a fastText model (bad magic number)"));
        }
        let version = reader.read_i32()?;
        if version > FASTTEXT_VERSION {
            return Err(invalid_data(format!(
                "unsupported fastText format version {}",
                version
            )));
        }

        let args = Args::read(reader, version)?;
        let dict = Dictionary::read(
            reader,
            SubwordParams {
                minn: args.minn,
                maxn: args.maxn,
                bucket: args.bucket,
                word_ngrams: args.word_ngrams,
            },
        )?;

        let quant_input = reader.read_bool()?;
        if !quant_input && dict.is_pruned() {
            return Err(invalid_data(
                "dictionary is pruned but the input matrix is not quantized",
            ));
        }
        let input = Matrix::read(reader, quant_input)?;
        let quant_output = reader.read_bool()?;
        let output = Matrix::read(reader, quant_input && quant_output)?;

        let loss = Loss::from_id(args.loss, dict.label_counts())?;

        if input.cols() != args.dim || output.cols() != args.dim {
            return Err(invalid_data(format!(
                "matrix width does not match dim {} (input {}, output {})",
                args.dim,
                input.cols(),
                output.cols()
            )));
        }
        if input.rows() < dict.input_rows_needed() {
            return Err(invalid_data(format!(
                "input matrix has {} rows, dictionary needs {}",
                input.rows(),
                dict.input_rows_needed()
            )));
        }
        let needed = loss.output_rows_needed(dict.nlabels());
        if output.rows() < needed {
            return Err(invalid_data(format!(
                "output matrix has {} rows, {} labels need {}",
                output.rows(),
                dict.nlabels(),
                needed
            )));
        }

        Ok(Self {
            dict,
            input,
            output,
            loss,
            dim: args.dim,
        })
    }

    /// Number of labels the model can emit
    pub fn label_count(&self) -> usize {
        self.dict.nlabels()
    }

    /// Rank labels for a single line of text
    ///
    /// Labels keep their `__label__` prefix. Text containing `'\n'` is
    /// rejected because the model scores exactly one line.
    pub fn predict(&self, text: &str, k: usize, threshold: f32) -> Result<Vec<RawPrediction>> {
        if text.contains('\n') {
            return Err(Error::Inference(
                "predict processes one line at a time (remove '\\n')".to_string(),
            ));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let ids = self.dict.line_ids(text.as_bytes());
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut hidden = zeroed(self.dim).map_err(|e| Error::Inference(e.to_string()))?;
        for &id in &ids {
            self.input.add_row(&mut hidden, id);
        }
        let scale = 1.0 / ids.len() as f32;
        hidden.iter_mut().for_each(|h| *h *= scale);

        let ranked = self
            .loss
            .predict(&self.output, &hidden, self.dict.nlabels(), k, threshold);

        Ok(ranked
            .into_iter()
            .map(|(label, log_prob)| {
                RawPrediction::new(
                    String::from_utf8_lossy(self.dict.label(label)),
                    log_prob.exp(),
                )
            })
            .collect())
    }
}

impl LanguageModel for FastTextModel {
    fn predict(&self, text: &str, k: usize, threshold: f32) -> Result<Vec<RawPrediction>> {
        FastTextModel::predict(self, text, k, threshold)
    }
}

/// Default [`ModelBackend`] backed by [`FastTextModel`]
#[derive(Debug, Default, Clone, Copy)]
pub struct FastTextBackend;

impl ModelBackend for FastTextBackend {
    fn load(&self, path: &Path) -> Result<Box<dyn LanguageModel>> {
        Ok(Box::new(FastTextModel::load(path)?))
    }
}
