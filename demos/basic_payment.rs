//! Basic usage examples for TxLoom

use ed25519_dalek::SigningKey;
use txloom::fee_calculator::FeeCalculator;
use txloom::hash::blake2b_224;
use txloom::prelude::*;
use txloom::transaction::Transaction;

const ADA: u64 = 1_000_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== TxLoom Basic Usage Examples ===\n");

    // Example 1: Building a simple payment
    let built = example_simple_payment().await?;

    // Example 2: Fees and minimum deposits
    example_fee_breakdown(&built)?;

    // Example 3: Signing and witness assembly
    example_signing(&built)?;

    // Example 4: Decoding the canonical bytes
    example_decoding(&built)?;

    Ok(())
}

fn wallet_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

fn wallet_address() -> Address {
    let key_hash = blake2b_224(wallet_key().verifying_key().as_bytes());
    Address::enterprise(0, &key_hash)
}

async fn example_simple_payment() -> Result<BuiltTransaction, Box<dyn std::error::Error>> {
    println!("Example 1: Building a Simple Payment");
    println!("------------------------------------");

    // Two UTXOs owned by the wallet, one of them carrying a token
    let token = Asset::new(Hash([0x55; 28]), AssetName::new(b"loom".to_vec())?);
    let utxos = vec![
        Utxo::new(
            TxIn::new(Hash([1u8; 32]), 0),
            TxOut::new(wallet_address(), Value::from_coin(5 * ADA)),
        ),
        Utxo::new(
            TxIn::new(Hash([2u8; 32]), 1),
            TxOut::new(
                wallet_address(),
                Value::from_coin(3 * ADA).with_asset(token.clone(), 100),
            ),
        ),
    ];
    let wallet = WalletContext::new(utxos, wallet_address());

    let recipient = Address::enterprise(0, &Hash([9u8; 28]));
    let mut builder = TxBuilder::new(ProtocolParameters::mainnet())
        .pay_to(recipient, Value::from_coin(4 * ADA).with_asset(token, 40))
        .metadata(674, Metadatum::Text("coffee".to_string()))
        .valid_until(150_000_000);
    let built = builder.build(&wallet, None).await?;

    println!("✓ Transaction built");
    println!("  Id: {}", built.id);
    println!("  Size: {} bytes", built.bytes.len());
    println!("  Inputs: {}", built.draft.inputs.len());
    println!("  Outputs: {}", built.draft.outputs.len());
    println!("  Change outputs: {}", built.draft.change_outputs.len());
    println!("  Fee: {} lovelace", built.fee);
    println!();

    Ok(built)
}

fn example_fee_breakdown(built: &BuiltTransaction) -> Result<(), Box<dyn std::error::Error>> {
    println!("Example 2: Fees and Minimum Deposits");
    println!("------------------------------------");

    let params = ProtocolParameters::mainnet();
    let calculator = FeeCalculator::new(&params);
    let estimate = calculator.draft_fee(&built.draft, CostModelEncoding::default())?;

    println!("Fee Estimate:");
    println!("  Size fee: {} ({} bytes)", estimate.size_fee, estimate.size);
    println!("  Reference script fee: {}", estimate.reference_script_fee);
    println!("  Execution fee: {}", estimate.ex_units_fee);
    println!("  Total: {} (paid {})", estimate.total, built.fee);

    println!("\n  Minimum deposits:");
    for (index, output) in built.draft.all_outputs().enumerate() {
        println!(
            "    #{}: holds {}, needs {}",
            index,
            output.coin(),
            calculator.min_deposit(output)?
        );
    }
    println!();

    Ok(())
}

fn example_signing(built: &BuiltTransaction) -> Result<(), Box<dyn std::error::Error>> {
    println!("Example 3: Signing and Witness Assembly");
    println!("---------------------------------------");

    let witness = sign(&built.id, &wallet_key());
    let signed = assemble(&built.bytes, &[witness])?;
    verify_transaction(&signed)?;

    println!("✓ Witness attached and verified");
    println!("  Signed size: {} bytes", signed.len());
    println!(
        "  Assembling again is a no-op: {}",
        assemble(&signed, &[witness])? == signed
    );
    println!();

    Ok(())
}

fn example_decoding(built: &BuiltTransaction) -> Result<(), Box<dyn std::error::Error>> {
    println!("Example 4: Decoding the Canonical Bytes");
    println!("---------------------------------------");

    let transaction = Transaction::from_bytes(&built.bytes)?;
    println!("✓ Transaction decoded");
    println!("  Id matches: {}", transaction.id()? == built.id);
    println!("  Re-encodes identically: {}", transaction.to_bytes()? == built.bytes);
    println!("  Valid until slot: {:?}", transaction.body.ttl);
    println!();

    Ok(())
}
