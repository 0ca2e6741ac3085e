
mod test_rate_limiter;
