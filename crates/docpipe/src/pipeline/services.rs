//! Collaborator registry handed to the pipeline at construction.

use std::sync::Arc;

use crate::chunker::{Chunker, TextChunker};
use crate::config::Config;
use crate::enhancer::{DisabledEnhancer, Enhancer, VisionEnhancer};
use crate::error::ConfigError;
use crate::index::{DisabledIndex, MemoryIndex, VectorIndex};
use crate::merge::MergePolicy;
use crate::processor::{LopdfParser, OcrEngine, StructuralParser, TesseractOcr};
use crate::storage::{FileSink, OutputSink};

/// Every service the pipeline calls, behind trait objects.
#[derive(Clone)]
pub struct Services {
    pub parser: Arc<dyn StructuralParser>,
    pub ocr: Arc<dyn OcrEngine>,
    pub enhancer: Arc<dyn Enhancer>,
    pub chunker: Arc<dyn Chunker>,
    pub index: Arc<dyn VectorIndex>,
    pub sink: Arc<dyn OutputSink>,
    pub merge_policy: MergePolicy,
}

impl Services {
    /// Production services built from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let ocr = if config.ocr.enabled {
            TesseractOcr::new(&config.ocr.languages, config.ocr.dpi)
        } else {
            TesseractOcr::disabled()
        };

        let enhancer: Arc<dyn Enhancer> = if config.enhancer.enabled {
            Arc::new(VisionEnhancer::new(&config.enhancer)?)
        } else {
            Arc::new(DisabledEnhancer)
        };

        let index: Arc<dyn VectorIndex> = if config.index.enabled {
            Arc::new(MemoryIndex::from_config(&config.index))
        } else {
            Arc::new(DisabledIndex)
        };

        Ok(Self {
            parser: Arc::new(LopdfParser::new()),
            ocr: Arc::new(ocr),
            enhancer,
            chunker: Arc::new(TextChunker::new()),
            index,
            sink: Arc::new(FileSink::new(config.output_path())),
            merge_policy: MergePolicy::default(),
        })
    }

    /// Starts from the stand-in services; replace the ones under test.
    pub fn builder(sink: Arc<dyn OutputSink>) -> ServicesBuilder {
        ServicesBuilder {
            services: Services {
                parser: Arc::new(LopdfParser::new()),
                ocr: Arc::new(TesseractOcr::disabled()),
                enhancer: Arc::new(DisabledEnhancer),
                chunker: Arc::new(TextChunker::new()),
                index: Arc::new(DisabledIndex),
                sink,
                merge_policy: MergePolicy::default(),
            },
        }
    }
}

pub struct ServicesBuilder {
    services: Services,
}

impl ServicesBuilder {
    pub fn parser(mut self, parser: Arc<dyn StructuralParser>) -> Self {
        self.services.parser = parser;
        self
    }

    pub fn ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.services.ocr = ocr;
        self
    }

    pub fn enhancer(mut self, enhancer: Arc<dyn Enhancer>) -> Self {
        self.services.enhancer = enhancer;
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.services.chunker = chunker;
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.services.index = index;
        self
    }

    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.services.merge_policy = policy;
        self
    }

    pub fn build(self) -> Services {
        self.services
    }
}
