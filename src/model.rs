use crate::{
    decode::{DecodeError, decode_image_rgb8},
    engine::RequestMetadata,
};
use kornia_vlm::paligemma::{Paligemma, PaligemmaConfig, PaligemmaError};

/// Maximum number of tokens generated for a single answer.
pub const DEFAULT_SAMPLE_LEN: usize = 100;

/// Trait for implementing inference models that can be used with the InfernumEngine.
///
/// Users implement this trait to define their custom model behavior, including
/// the request and response types and the inference logic.
pub trait InfernumModel {
    /// The request type that the model accepts for inference.
    type Request;
    /// The response type that the model returns after inference.
    type Response;
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs inference on the given request and returns a response or error.
    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error>;
}

/// A question about a picture, as received from the client.
pub struct VqaRequest {
    /// The question about the picture.
    pub question: String,
    /// The still encoded picture.
    pub image: Vec<u8>,
}

/// What the engine remembers about a [`VqaRequest`] once the image has been consumed.
#[derive(Debug, Clone)]
pub struct VqaMetadata {
    /// The question as sent by the client.
    pub question: String,
    /// Size of the encoded picture in bytes.
    pub image_bytes: usize,
}

impl RequestMetadata for VqaRequest {
    type Metadata = VqaMetadata;

    fn metadata(&self) -> Self::Metadata {
        VqaMetadata {
            question: self.question.clone(),
            image_bytes: self.image.len(),
        }
    }
}

/// The generated answer.
#[derive(Debug, Clone)]
pub struct VqaResponse {
    /// Decoded text without special tokens or surrounding whitespace.
    pub answer: String,
}

/// Errors raised while answering a question.
#[derive(thiserror::Error, Debug)]
pub enum VqaError {
    /// The uploaded bytes are not a picture.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Loading or running the model failed.
    #[error(transparent)]
    Paligemma(#[from] PaligemmaError),
}

/// Visual question answering on top of the PaliGemma model.
///
/// The tokenizer and the weights are fetched from the Hugging Face hub when the model is
/// created, so construction blocks until everything is on disk and mapped in memory.
pub struct PaligemmaVqa {
    model: Paligemma,
    sample_len: usize,
}

impl PaligemmaVqa {
    /// Load the model.
    ///
    /// # Arguments
    ///
    /// * `config` - The sampling configuration for the PaliGemma model
    /// * `sample_len` - The maximum number of generated tokens per answer
    pub fn new(config: PaligemmaConfig, sample_len: usize) -> Result<Self, VqaError> {
        let model = Paligemma::new(config)?;
        Ok(Self { model, sample_len })
    }
}

impl InfernumModel for PaligemmaVqa {
    type Request = VqaRequest;
    type Response = VqaResponse;
    type Error = VqaError;

    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error> {
        let image = decode_image_rgb8(&request.image)?;
        log::debug!(
            "Decoded {}x{} image",
            image.size().width,
            image.size().height
        );

        let answer = self
            .model
            .inference(&image, &request.question, self.sample_len, false)?;

        Ok(VqaResponse {
            answer: answer.trim().to_string(),
        })
    }
}
