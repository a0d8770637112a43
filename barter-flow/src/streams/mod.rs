/// Idle timeout adapter for source streams.
pub mod timeout;
