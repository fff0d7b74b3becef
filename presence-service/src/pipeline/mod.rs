use std::{pin::Pin, sync::Arc};

use futures::{Stream, StreamExt, TryStreamExt};
use presence_client::domain::Reading;

use crate::model::{ModelError, PresenceTable};

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self { payload }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type ReadingStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> ReadingStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

/// Destination of a finished presence table.
#[async_trait::async_trait]
pub trait PresenceSink: Send + Sync {
    async fn write(&self, table: &PresenceTable) -> Result<(), PipelineError>;
}

/// One input series: a source plus same-type transforms applied in order.
pub struct ReadingPipeline<S> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<Reading, Reading> + Send + Sync>>,
}

impl<S> ReadingPipeline<S>
where
    S: Source<Reading> + Send + Sync + 'static,
{
    /// Drain the source into memory. The first error aborts the whole series.
    pub async fn collect(self) -> Result<Vec<Reading>, PipelineError> {
        let mut stream = self.source.stream().await;

        for t in self.transforms {
            let t_arc = t.clone();
            stream = Box::pin(stream.then(move |item| {
                let t_inner = t_arc.clone();
                async move {
                    match item {
                        Ok(env) => t_inner.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        stream.map_ok(|env| env.payload).try_collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    struct VecSource(Vec<Result<Reading, String>>);

    #[async_trait::async_trait]
    impl Source<Reading> for VecSource {
        async fn stream(&self) -> ReadingStream<Reading> {
            let items: Vec<_> = self
                .0
                .iter()
                .cloned()
                .map(|r| r.map(Envelope::new).map_err(PipelineError::Source))
                .collect();
            Box::pin(futures::stream::iter(items))
        }
    }

    struct Double;

    #[async_trait::async_trait]
    impl Transform<Reading, Reading> for Double {
        async fn apply(&self, mut input: Envelope<Reading>) -> Result<Envelope<Reading>, PipelineError> {
            input.payload.value *= 2.0;
            Ok(input)
        }
    }

    fn reading(value: f64) -> Reading {
        Reading {
            ts: datetime!(2021-03-01 08:00:00 UTC),
            household_id: "u1".to_string(),
            value,
        }
    }

    #[tokio::test]
    async fn transforms_are_applied_in_order() {
        let pipeline = ReadingPipeline {
            source: VecSource(vec![Ok(reading(1.0)), Ok(reading(2.5))]),
            transforms: vec![Arc::new(Double), Arc::new(Double)],
        };

        let values: Vec<f64> = pipeline.collect().await.unwrap().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![4.0, 10.0]);
    }

    #[tokio::test]
    async fn first_error_aborts_collection() {
        let pipeline = ReadingPipeline {
            source: VecSource(vec![Ok(reading(1.0)), Err("bad row".to_string()), Ok(reading(3.0))]),
            transforms: vec![],
        };

        let err = pipeline.collect().await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(msg) if msg == "bad row"));
    }
}
