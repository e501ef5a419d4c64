pub mod imm;
pub mod imm_writer;
