use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::predicate;
use tempfile::TempDir;

fn genomes() -> Result<TempDir, Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let genomes = dir.path().join("genomes");
    fs::create_dir(&genomes)?;
    fs::write(genomes.join("A1.fa"), ">A1\nAAACC\nCCAA\n")?;
    fs::write(genomes.join("A2.fa"), ">A2\nAACCCCAA\n")?;
    fs::write(genomes.join("B1.fa"), ">B1\nAACCAACC\n")?;
    Ok(dir)
}

fn store(dir: &TempDir) -> PathBuf {
    dir.path().join("kmers.redb")
}

fn ingest(dir: &TempDir, extra: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("ingest")
        .arg("--store")
        .arg(store(dir))
        .args(&["-k", "2", "-m", "1"])
        .args(extra)
        .arg(dir.path().join("genomes"));
    cmd.assert().success();
    Ok(())
}

fn json_output(cmd: &mut Command) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let output = cmd.output()?;
    assert!(output.status.success());
    Ok(serde_json::from_reader(Cursor::new(output.stdout))?)
}

fn genome(dir: &TempDir, name: &str) -> String {
    dir.path().join("genomes").join(name).display().to_string()
}

#[test]
fn file_doesnt_exist() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("ingest")
        .arg("--store")
        .arg(store(&dir))
        .arg("test/file/doesnt/exist");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("test/file/doesnt/exist"))
        .stderr(predicate::str::contains("No such file or directory"));

    Ok(())
}

#[test]
fn zero_kmer_length_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = genomes()?;
    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("ingest")
        .arg("--store")
        .arg(store(&dir))
        .args(&["-k", "0"])
        .arg(dir.path().join("genomes"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("kmer length"));
    assert!(!store(&dir).exists());

    Ok(())
}

#[test]
fn kmerdb_vectors() -> Result<(), Box<dyn std::error::Error>> {
    let dir = genomes()?;
    ingest(&dir, &[])?;

    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("vectors")
        .arg("--store")
        .arg(store(&dir))
        .arg("-O")
        .arg(dir.path().join("genomes"));
    let matrix = json_output(&mut cmd)?;

    assert_eq!(matrix["kmers"], serde_json::json!(["AA", "AC", "CA", "CC"]));
    assert_eq!(matrix["files"][0], genome(&dir, "A1.fa"));
    assert_eq!(
        matrix["vectors"],
        serde_json::json!([[3, 1, 1, 3], [2, 1, 1, 3], [2, 2, 1, 2]])
    );

    Ok(())
}

#[test]
fn kmerdb_vectors_to_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = genomes()?;
    ingest(&dir, &[])?;

    let output = dir.path().join("vectors");
    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("vectors")
        .arg("--store")
        .arg(store(&dir))
        .arg("-o")
        .arg(&output)
        .arg(genome(&dir, "B1.fa"));
    cmd.assert().success();

    let written = fs::read(dir.path().join("vectors.json"))?;
    let matrix: serde_json::Value = serde_json::from_slice(&written)?;
    assert_eq!(matrix["vectors"], serde_json::json!([[2, 2, 1, 2]]));

    Ok(())
}

#[test]
fn kmerdb_vectors_needs_an_output() -> Result<(), Box<dyn std::error::Error>> {
    let dir = genomes()?;
    ingest(&dir, &[])?;

    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("vectors")
        .arg("--store")
        .arg(store(&dir))
        .arg(dir.path().join("genomes"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--output"));

    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("vocab")
        .arg("--store")
        .arg(store(&dir))
        .arg("-O")
        .arg("-o")
        .arg(dir.path().join("vocab"));
    cmd.assert().failure();
    assert!(!dir.path().join("vocab.json").exists());

    Ok(())
}

#[test]
fn kmerdb_vocab() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let genome = dir.path().join("TEMP.fasta");
    fs::write(
        &genome,
        ">label1\nATAT\n>label2\nCGCG\n>label3\nAAAA\n>label4\nAGGA\n>label5\nCGCG\n",
    )?;

    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("ingest")
        .arg("--store")
        .arg(store(&dir))
        .args(&["-k", "4", "-m", "0"])
        .arg(&genome);
    cmd.assert().success();

    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("vocab").arg("--store").arg(store(&dir)).arg("-O");
    let vocab = json_output(&mut cmd)?;
    assert_eq!(vocab, serde_json::json!(["AAAA", "AGGA", "ATAT", "CGCG"]));

    Ok(())
}

#[test]
fn kmerdb_add_to_intersection() -> Result<(), Box<dyn std::error::Error>> {
    let dir = genomes()?;
    ingest(&dir, &["--intersect"])?;

    let extra = dir.path().join("B2.fa");
    fs::write(&extra, ">B2\nAAAAAAT\n")?;
    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("add").arg("--store").arg(store(&dir)).arg(&extra);
    cmd.assert().success();

    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("vectors")
        .arg("--store")
        .arg(store(&dir))
        .arg("-O")
        .arg(dir.path().join("genomes"))
        .arg(&extra);
    let matrix = json_output(&mut cmd)?;
    assert_eq!(matrix["kmers"], serde_json::json!(["AA", "AC", "CA", "CC"]));
    assert_eq!(matrix["vectors"][3], serde_json::json!([5, 0, 0, 0]));

    Ok(())
}

#[test]
fn kmerdb_vectors_of_unknown_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = genomes()?;
    ingest(&dir, &[])?;

    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("vectors")
        .arg("--store")
        .arg(store(&dir))
        .arg("-O")
        .arg("never/counted.fa");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("never/counted.fa"));

    Ok(())
}

#[test]
fn kmerdb_info() -> Result<(), Box<dyn std::error::Error>> {
    let dir = genomes()?;
    ingest(&dir, &[])?;

    let mut cmd = Command::cargo_bin("kmerdb")?;
    cmd.arg("info").arg("--store").arg(store(&dir));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Kmer length: 2"))
        .stdout(predicate::str::contains("Vocabulary size: 4"))
        .stdout(predicate::str::contains("Histogram: [2, 0, 2]"));

    Ok(())
}
