//! Claude output to OpenAI chat completion translation.

mod prompt;
mod translator;

use futures::{Stream, StreamExt};

use ccgw_core::openai::{ChatCompletion, ChatCompletionChunk};

use crate::session::EventStream;

pub use prompt::{Prompt, PromptError, build_prompt};
pub use translator::{DONE_MARKER, StreamTranslator, aggregate};

/// Chunks for one session: role chunk, content chunks, final chunk.
///
/// The final chunk is emitted whenever the record stream ends, including on
/// output timeout.
pub fn chunk_stream(
    mut events: EventStream,
    model: String,
) -> impl Stream<Item = ChatCompletionChunk> + Send {
    async_stream::stream! {
        let mut translator = StreamTranslator::new(model);
        yield translator.role_chunk();
        while let Some(record) = events.next().await {
            for chunk in translator.convert(&record) {
                yield chunk;
            }
        }
        yield translator.final_chunk();
    }
}

/// Drain a session into one non-streaming completion.
pub async fn collect_completion(mut events: EventStream, model: String) -> ChatCompletion {
    let mut translator = StreamTranslator::new(model);
    let mut content = String::new();
    while let Some(record) = events.next().await {
        for fragment in translator.fragments(&record) {
            content.push_str(&fragment);
        }
    }
    translator.completion(content)
}
