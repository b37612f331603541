pub mod directory;
pub mod storage;
pub mod supabase;
