//! 테스트용 가짜 프로바이더

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::completion::CompletionProvider;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// 어휘별 축을 갖는 단어 빈도 임베딩
///
/// 받은 입력을 기록하며, 복제본끼리 기록을 공유합니다.
#[derive(Clone)]
pub(crate) struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
    fail_on: Option<&'static str>,
    inputs: Arc<Mutex<Vec<String>>>,
}

impl KeywordEmbedder {
    pub(crate) fn new(vocabulary: &[&'static str]) -> Self {
        Self {
            vocabulary: vocabulary.to_vec(),
            fail_on: None,
            inputs: Arc::new(Mutex::new(vec![])),
        }
    }

    pub(crate) fn rome() -> Self {
        Self::new(&["rome", "founded", "senate", "governed", "753"])
    }

    /// `needle`을 포함한 텍스트에서 벡터 없는 응답을 흉내냄
    pub(crate) fn failing_on(mut self, needle: &'static str) -> Self {
        self.fail_on = Some(needle);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    /// 지금까지 임베딩 요청된 텍스트 (호출 순서)
    pub(crate) fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.vocabulary.len()];
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            if let Some(axis) = self.vocabulary.iter().position(|v| *v == word) {
                vector[axis] += 1.0;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inputs.lock().unwrap().push(text.to_string());
        if let Some(needle) = self.fail_on {
            if text.contains(needle) {
                return Err(RagError::MalformedResponse {
                    service: "embedding",
                    detail: "missing field `embedding`".to_string(),
                });
            }
        }
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// 받은 프롬프트를 기록하고 고정 답변을 돌려주는 완성 프로바이더
///
/// 복제본끼리 기록을 공유합니다.
#[derive(Clone)]
pub(crate) struct RecordingCompleter {
    answer: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl RecordingCompleter {
    pub(crate) fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Arc::new(Mutex::new(vec![])),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for RecordingCompleter {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
