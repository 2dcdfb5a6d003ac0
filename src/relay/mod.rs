// ─── Core: records → aggregate → tier → invites ───
pub mod aggregator;
pub mod invite;
pub mod store;
pub mod tier;

// ─── Edges: postback parsing, chat replies, lookup bot ───
pub mod bot;
pub mod postback;
pub mod replies;

// ─── Shared types ───
pub mod types;
