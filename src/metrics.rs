// Metrics placeholders for the payment pipeline.
// If a metrics infrastructure exists later, swap these no-ops with real counters/histograms.

#[macro_export]
macro_rules! payment_counter_inc {
    ($name:expr $(, $key:expr => $val:expr )* $(,)?) => {
        // no-op placeholder
        let _ = ($name $(, $key, $val )*);
    };
}

#[macro_export]
macro_rules! payment_histogram_observe_ms {
    ($name:expr, $ms:expr $(, $key:expr => $val:expr )* $(,)?) => {
        // no-op placeholder
        let _ = ($name, $ms $(, $key, $val )*);
    };
}
