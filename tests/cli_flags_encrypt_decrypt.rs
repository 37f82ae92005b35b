use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::{fs, io::Read, process::Command};

fn read_all(path: &std::path::Path) -> Vec<u8> {
    let mut f = fs::File::open(path).expect("open");
    let mut v = Vec::new();
    f.read_to_end(&mut v).expect("read");
    v
}

fn make_pw(td: &assert_fs::TempDir) -> std::path::PathBuf {
    let pw = td.child("pw.txt");
    pw.write_str("pw\n").expect("write pw");
    pw.path().to_path_buf()
}

fn make_keyfile(td: &assert_fs::TempDir) -> std::path::PathBuf {
    let kf = td.child("key.json");
    Command::cargo_bin("chunkcrypt")
        .expect("binary")
        .args(["keygen", "--out"])
        .arg(kf.path())
        .assert()
        .success();
    kf.path().to_path_buf()
}

fn make_plain_small(td: &assert_fs::TempDir) -> std::path::PathBuf {
    let p = td.child("a.txt");
    p.write_str("hello\nworld\n").expect("write");
    p.path().to_path_buf()
}

fn make_plain_big(td: &assert_fs::TempDir) -> std::path::PathBuf {
    // ~300 KiB to ensure multiple streaming chunks
    let p = td.child("big.bin");
    let data: Vec<u8> = (0..300_000).map(|i| (i % 251) as u8).collect();
    p.write_binary(&data).expect("write");
    p.path().to_path_buf()
}

// ------------------------- Whole-buffer roundtrips ---------------------------

#[test]
fn cli_whole_long_password_file() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let plain = make_plain_small(&td);
    let ct = td.child("a.enc");
    let out = td.child("a.out");
    let pw = make_pw(&td);

    Command::cargo_bin("chunkcrypt")?
        .args(["enc", "--in"])
        .arg(&plain)
        .args(["--out"])
        .arg(ct.path())
        .args(["--password-file"])
        .arg(&pw)
        .assert()
        .success();

    assert_eq!(read_all(ct.path())[0], 0x01);

    Command::cargo_bin("chunkcrypt")?
        .args(["dec", "-i"])
        .arg(ct.path())
        .args(["-o"])
        .arg(out.path())
        .args(["-p"])
        .arg(&pw)
        .assert()
        .success();

    assert_eq!(read_all(out.path()), read_all(&plain));
    td.close()?;
    Ok(())
}

#[test]
fn cli_wrong_password_fails() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let plain = make_plain_small(&td);
    let ct = td.child("a.enc");
    let pw = make_pw(&td);
    let bad = td.child("bad.txt");
    bad.write_str("nope")?;

    Command::cargo_bin("chunkcrypt")?
        .args(["enc", "-i"])
        .arg(&plain)
        .args(["-o"])
        .arg(ct.path())
        .args(["-p"])
        .arg(&pw)
        .assert()
        .success();

    let out = td.child("a.out");
    Command::cargo_bin("chunkcrypt")?
        .args(["dec", "-i"])
        .arg(ct.path())
        .args(["-o"])
        .arg(out.path())
        .args(["-p"])
        .arg(bad.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("decryption failed"));

    out.assert(predicate::path::missing());
    td.close()?;
    Ok(())
}

// ------------------------- Streaming roundtrips ------------------------------

#[test]
fn cli_streaming_keyfile_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let plain = make_plain_big(&td);
    let ct = td.child("big.enc");
    let out = td.child("big.out");
    let kf = make_keyfile(&td);

    Command::cargo_bin("chunkcrypt")?
        .args(["enc", "--in"])
        .arg(&plain)
        .args(["--out"])
        .arg(ct.path())
        .args(["-k"])
        .arg(&kf)
        .args(["--stream"])
        .args(["--chunk-size", "65536"])
        .assert()
        .success();

    let bytes = read_all(ct.path());
    assert_eq!(bytes[0], 0x12);
    assert_eq!(&bytes[2..6], &65536u32.to_le_bytes());

    Command::cargo_bin("chunkcrypt")?
        .args(["dec", "--in"])
        .arg(ct.path())
        .args(["--out"])
        .arg(out.path())
        .args(["--keyfile"])
        .arg(&kf)
        .assert()
        .success();

    assert_eq!(read_all(out.path()), read_all(&plain));
    td.close()?;
    Ok(())
}

#[test]
fn cli_threshold_promotes_to_streaming() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let plain = make_plain_big(&td);
    let kf = make_keyfile(&td);

    Command::cargo_bin("chunkcrypt")?
        .args(["enc", "-i"])
        .arg(&plain)
        .args(["-k"])
        .arg(&kf)
        .args(["--stream-threshold", "1000"])
        .assert()
        .success();

    let ct = td.child("big.bin.enc");
    ct.assert(predicate::path::exists());
    assert_eq!(read_all(ct.path())[0], 0x12);

    Command::cargo_bin("chunkcrypt")?
        .args(["inspect"])
        .arg(ct.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("keyfile streaming"));

    td.close()?;
    Ok(())
}

// ------------------------- Flags and misc ------------------------------------

#[test]
fn cli_enc_overwrite_requires_force() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let plain = make_plain_small(&td);
    let kf = make_keyfile(&td);
    let ct = td.child("a.enc");
    ct.write_str("existing")?;

    Command::cargo_bin("chunkcrypt")?
        .args(["enc", "-i"])
        .arg(&plain)
        .args(["-o"])
        .arg(ct.path())
        .args(["-k"])
        .arg(&kf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("use --force"));
    ct.assert("existing");

    Command::cargo_bin("chunkcrypt")?
        .args(["enc", "-i"])
        .arg(&plain)
        .args(["-o"])
        .arg(ct.path())
        .args(["-k"])
        .arg(&kf)
        .args(["--force"])
        .assert()
        .success();
    assert_eq!(read_all(ct.path())[0], 0x02);

    td.close()?;
    Ok(())
}

#[test]
fn cli_password_and_keyfile_conflict() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let plain = make_plain_small(&td);
    let pw = make_pw(&td);
    let kf = make_keyfile(&td);

    Command::cargo_bin("chunkcrypt")?
        .args(["enc", "-i"])
        .arg(&plain)
        .args(["-p"])
        .arg(&pw)
        .args(["-k"])
        .arg(&kf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));

    td.close()?;
    Ok(())
}

#[test]
fn cli_keygen_refuses_existing_without_force() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let kf = make_keyfile(&td);
    let before = read_all(&kf);

    Command::cargo_bin("chunkcrypt")?
        .args(["keygen", "-o"])
        .arg(&kf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("use --force"));
    assert_eq!(read_all(&kf), before);

    Command::cargo_bin("chunkcrypt")?
        .args(["keygen", "-o"])
        .arg(&kf)
        .args(["-f"])
        .assert()
        .success();
    assert_ne!(read_all(&kf), before);

    let text = fs::read_to_string(&kf)?;
    assert!(text.contains("\"algorithm\": \"AES-256-GCM\""));
    assert!(text.contains("\"createdAt\""));

    td.close()?;
    Ok(())
}

#[test]
fn cli_inspect_rejects_foreign_file() -> Result<(), Box<dyn std::error::Error>> {
    let td = assert_fs::TempDir::new()?;
    let f = td.child("plain.txt");
    f.write_str("just text")?;

    Command::cargo_bin("chunkcrypt")?
        .args(["inspect"])
        .arg(f.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a chunkcrypt container"));

    td.close()?;
    Ok(())
}
