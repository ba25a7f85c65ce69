// Chat-model access for the assistant: the streaming client, the database
// tools the model may call, and prompt construction.

pub mod client;
pub mod prompt;
pub mod tools;
