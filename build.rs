fn main() {
    prost_build::compile_protos(&["proto/mexc.proto"], &["proto/"])
        .expect("failed to compile proto/mexc.proto");
}
